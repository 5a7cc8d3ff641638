//! Broadcast hub for live stream subscribers.
//!
//! Every subscriber owns a bounded queue. Publishing never waits on a
//! subscriber: an event is offered with `try_send` and a connection whose
//! queue is closed or full is evicted on the spot. A periodic heartbeat
//! exercises the same path so silently dead connections are evicted within
//! one heartbeat interval.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tokensync_core::MutationRecord;
use tokensync_proto::{HubEvent, TokenUpdate};
use uuid::Uuid;

/// Opaque identifier of a stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Connection lifecycle. `Closed` is terminal.
///
/// A connection is `Open` exactly while the hub holds it; ids are never
/// reused, so removal can not be undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Registered and accepting events
    Open,
    /// Deregistered; never reopened
    Closed,
}

#[derive(Debug)]
struct Connection {
    sender: mpsc::Sender<Arc<HubEvent>>,
    connected_at: DateTime<Utc>,
}

impl Connection {
    fn is_live(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Hub sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Maximum simultaneous connections
    pub max_connections: usize,
    /// Per-connection queue length
    pub buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            buffer: 64,
        }
    }
}

/// Hub errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The connection limit has been reached
    #[error("too many stream connections (limit {limit})")]
    TooManyConnections {
        /// Configured limit
        limit: usize,
    },
}

/// Fan-out of events to every live connection.
#[derive(Debug)]
pub struct BroadcastHub {
    config: HubConfig,
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl BroadcastHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new(config: HubConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            connections: RwLock::new(HashMap::new()),
        })
    }

    /// Register a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::TooManyConnections`] when the hub is full.
    pub fn subscribe(self: &Arc<Self>) -> Result<Subscription, HubError> {
        let (sender, receiver) = mpsc::channel(self.config.buffer.max(1));
        let id = ConnectionId::new();

        let total = {
            let mut connections = self.connections.write();
            if connections.len() >= self.config.max_connections {
                tracing::warn!(
                    limit = self.config.max_connections,
                    "Rejecting stream connection"
                );
                return Err(HubError::TooManyConnections {
                    limit: self.config.max_connections,
                });
            }
            connections.insert(
                id,
                Connection {
                    sender,
                    connected_at: Utc::now(),
                },
            );
            connections.len()
        };

        tracing::info!(connection_id = %id, total, "Stream client connected");
        Ok(Subscription {
            id,
            events: ReceiverStream::new(receiver),
            hub: Arc::downgrade(self),
        })
    }

    /// Remove a connection. Removing an unknown connection is a no-op.
    pub fn unsubscribe(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().remove(&id);
        match removed {
            Some(connection) => {
                tracing::info!(
                    connection_id = %id,
                    connected_for_secs = (Utc::now() - connection.connected_at).num_seconds(),
                    total = self.connection_count(),
                    "Stream client disconnected"
                );
                true
            }
            None => false,
        }
    }

    /// Whether `id` is registered, open, and its receiver still attached.
    #[must_use]
    pub fn is_live(&self, id: ConnectionId) -> bool {
        self.connections
            .read()
            .get(&id)
            .is_some_and(Connection::is_live)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Queue an event for a single connection. Evicts it on failure.
    pub fn send_to(&self, id: ConnectionId, event: HubEvent) -> bool {
        let sender = self
            .connections
            .read()
            .get(&id)
            .filter(|c| c.is_live())
            .map(|c| c.sender.clone());

        let delivered = sender.is_some_and(|sender| sender.try_send(Arc::new(event)).is_ok());
        if !delivered {
            self.evict(&[(id, "send failed")]);
        }
        delivered
    }

    /// Offer `event` to every live connection, evicting those that fail.
    ///
    /// Returns the number of connections the event was queued for.
    pub fn publish(&self, event: HubEvent) -> usize {
        let event = Arc::new(event);
        let snapshot: Vec<(ConnectionId, Option<mpsc::Sender<Arc<HubEvent>>>)> = self
            .connections
            .read()
            .iter()
            .map(|(id, c)| (*id, c.is_live().then(|| c.sender.clone())))
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, sender) in snapshot {
            let Some(sender) = sender else {
                dead.push((id, "liveness check failed"));
                continue;
            };
            match sender.try_send(Arc::clone(&event)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => dead.push((id, "queue full")),
                Err(TrySendError::Closed(_)) => dead.push((id, "transport closed")),
            }
        }

        self.evict(&dead);
        tracing::debug!(event = event.name(), delivered, evicted = dead.len(), "Published event");
        delivered
    }

    /// Publish a mutation record as a `token-update` event.
    pub fn publish_record(&self, record: &MutationRecord) -> usize {
        let delivered = self.publish(HubEvent::TokenUpdate(TokenUpdate::from(record)));
        tracing::info!(
            version = record.version,
            changed = record.changed_paths.len(),
            clients = delivered,
            "Broadcast token update"
        );
        delivered
    }

    /// Send a heartbeat to every connection. This is also the liveness sweep.
    pub fn heartbeat(&self) -> usize {
        self.publish(HubEvent::Heartbeat {
            timestamp: Utc::now(),
            client_count: self.connection_count(),
        })
    }

    /// Run [`BroadcastHub::heartbeat`] every `interval` until the hub is dropped.
    ///
    /// `interval` must be non-zero; the task panics on its first tick otherwise.
    pub fn spawn_heartbeat(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let hub = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(hub) = hub.upgrade() else {
                    break;
                };
                hub.heartbeat();
            }
        })
    }

    fn evict(&self, dead: &[(ConnectionId, &'static str)]) {
        if dead.is_empty() {
            return;
        }
        let mut connections = self.connections.write();
        for (id, reason) in dead {
            if connections.remove(id).is_some() {
                tracing::info!(connection_id = %id, reason, "Evicted stream client");
            }
        }
    }
}

/// Receiving end of a hub connection.
///
/// Dropping the subscription deregisters the connection.
#[derive(Debug)]
pub struct Subscription {
    id: ConnectionId,
    events: ReceiverStream<Arc<HubEvent>>,
    hub: Weak<BroadcastHub>,
}

impl Subscription {
    /// The connection identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the hub still holds this connection.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        match self.hub.upgrade() {
            Some(hub) if hub.connections.read().contains_key(&self.id) => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }

    /// Wait for the next event. `None` once the connection is evicted.
    pub async fn recv(&mut self) -> Option<Arc<HubEvent>> {
        self.events.next().await
    }
}

impl Stream for Subscription {
    type Item = Arc<HubEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokensync_core::{ChangeSet, LedgerConfig, VersionLedger};

    fn record(ledger: &mut VersionLedger, path: &str) -> Arc<MutationRecord> {
        let mut changes = ChangeSet::default();
        changes.changed_paths.push(path.to_string());
        ledger.record_mutation(changes, Vec::new(), format!("hash-{path}"))
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber_in_order() {
        let hub = BroadcastHub::new(HubConfig::default());
        let mut a = hub.subscribe().unwrap();
        let mut b = hub.subscribe().unwrap();
        let mut ledger = VersionLedger::new(LedgerConfig::default(), "h0");

        for path in ["x", "y"] {
            assert_eq!(hub.publish_record(&record(&mut ledger, path)), 2);
        }

        for sub in [&mut a, &mut b] {
            for expected in [2, 3] {
                let event = sub.recv().await.unwrap();
                let HubEvent::TokenUpdate(update) = &*event else {
                    panic!("expected token update, got {event:?}");
                };
                assert_eq!(update.version, expected);
            }
        }
    }

    #[test]
    fn recv_waits_for_publish() {
        let hub = BroadcastHub::new(HubConfig::default());
        let mut sub = hub.subscribe().unwrap();
        let mut recv = tokio_test::task::spawn(sub.recv());

        tokio_test::assert_pending!(recv.poll());
        hub.heartbeat();
        assert!(recv.is_woken());
        let event = tokio_test::assert_ready!(recv.poll()).unwrap();
        assert!(matches!(&*event, HubEvent::Heartbeat { client_count: 1, .. }));
    }

    #[tokio::test]
    async fn dropped_subscription_is_deregistered() {
        let hub = BroadcastHub::new(HubConfig::default());
        let sub = hub.subscribe().unwrap();
        let id = sub.id();
        assert!(hub.is_live(id));

        drop(sub);
        assert!(!hub.is_live(id));
        assert_eq!(hub.connection_count(), 0);
        assert!(!hub.unsubscribe(id));
    }

    #[tokio::test]
    async fn dead_connection_is_evicted_on_next_publish() {
        let hub = BroadcastHub::new(HubConfig::default());
        let live = hub.subscribe().unwrap();

        // A transport that vanished without running Drop
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let dead_id = ConnectionId::new();
        hub.connections.write().insert(
            dead_id,
            Connection {
                sender,
                connected_at: Utc::now(),
            },
        );
        assert!(!hub.is_live(dead_id));
        assert_eq!(hub.connection_count(), 2);

        assert_eq!(hub.heartbeat(), 1);
        assert_eq!(hub.connection_count(), 1);
        assert!(hub.is_live(live.id()));
    }

    #[tokio::test]
    async fn full_queue_evicts_slow_client() {
        let hub = BroadcastHub::new(HubConfig {
            max_connections: 10,
            buffer: 2,
        });
        let slow = hub.subscribe().unwrap();
        let mut fast = hub.subscribe().unwrap();

        for _ in 0..3 {
            hub.heartbeat();
            fast.recv().await.unwrap();
        }

        assert!(!hub.is_live(slow.id()));
        assert_eq!(slow.state(), ConnectionState::Closed);
        assert!(hub.is_live(fast.id()));
        assert_eq!(fast.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn connection_limit_is_enforced() {
        let hub = BroadcastHub::new(HubConfig {
            max_connections: 1,
            buffer: 4,
        });
        let _first = hub.subscribe().unwrap();
        assert_eq!(
            hub.subscribe().unwrap_err(),
            HubError::TooManyConnections { limit: 1 }
        );
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent_and_ends_stream() {
        let hub = BroadcastHub::new(HubConfig::default());
        let mut sub = hub.subscribe().unwrap();

        assert!(hub.unsubscribe(sub.id()));
        assert!(!hub.unsubscribe(sub.id()));
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn heartbeat_task_ticks() {
        let hub = BroadcastHub::new(HubConfig::default());
        let mut sub = hub.subscribe().unwrap();
        let task = hub.spawn_heartbeat(Duration::from_millis(20));

        let event = sub.recv().await.unwrap();
        assert!(matches!(
            &*event,
            HubEvent::Heartbeat { client_count: 1, .. }
        ));
        task.abort();
    }
}
