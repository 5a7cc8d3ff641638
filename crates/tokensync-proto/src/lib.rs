//! # tokensync Protocol
//!
//! Wire types shared by the server and its clients.
//!
//! ## Streaming events
//!
//! Every event pushed over the stream is a [`HubEvent`]: an event name
//! (`connected`, `missed-updates`, `sync-required`, `status`, `token-update`,
//! `heartbeat`) and a JSON payload tagged with an upper-case `type`.
//!
//! ## HTTP messages
//!
//! Request and response bodies for the token, catch-up and platform routes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod events;
pub mod messages;

pub use events::{HubEvent, HubStatus, TokenUpdate, UpdateData};
pub use messages::{
    BatchItem, BatchItemResult, BatchReport, BatchRequest, BuildRequest, DeleteResponse,
    PollingRegistration, StreamStatus, SyncCheckResponse, UpdatesSinceResponse, WriteRequest,
    WriteResponse,
};
