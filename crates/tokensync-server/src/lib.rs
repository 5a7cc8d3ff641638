//! # tokensync Server
//!
//! HTTP service that stores a design-token document and streams every
//! accepted change to connected clients.
//!
//! ## Components
//!
//! 1. **Token store**: loads, mutates and persists the document under one
//!    write lock, then diffs, versions and publishes the change
//! 2. **Broadcast hub**: per-client bounded queues with evict-on-failure
//!    fan-out and a periodic heartbeat
//! 3. **Routes**: token CRUD, platform builds, the SSE stream and its
//!    polling fallback

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod hub;
pub mod persistence;
pub mod routes;
pub mod store;

pub use config::ServerConfig;
pub use error::ApiError;
pub use hub::{BroadcastHub, ConnectionId, ConnectionState, HubConfig, HubError, Subscription};
pub use persistence::{DocumentBackend, JsonFileStore, MemoryStore, PersistenceError};
pub use routes::{router, AppState};
pub use store::{CatchUp, StoreError, StoreSettings, TokenStore};
