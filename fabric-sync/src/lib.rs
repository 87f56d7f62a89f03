//! # fabric-sync
//!
//! A cluster state-synchronization fabric. One node acts as the hub; the
//! others follow it over a bidirectional streaming link. Each node hosts
//! reporters (snapshot producers) and receivers (snapshot consumers) for a
//! small closed set of components; the fabric periodically pulls fresh
//! snapshots from local reporters, forwards them along every connected link,
//! and delivers incoming snapshots to the matching local receivers.
//!
//! ## Architecture
//!
//! ```text
//!  follower A ──┐                      ┌── follower C
//!               │   Join/Welcome +     │
//!               ├── MessageBatch ─────►│
//!               │   streams            │
//!          ┌────┴──────────────────────┴────┐
//!          │            hub B               │
//!          │  Syncer ── driver task ──────┐ │
//!          │   (store · registry · peers) │ │
//!          └───────────────────────────────┘
//! ```
//!
//! All shared state lives inside a single driver task; reactors and the
//! public facade talk to it over a command channel, which is what keeps the
//! routing table and peer table lock-free.
//!
//! Delivery is best-effort with latest-version-wins per
//! `(origin, component)`; there is no durability and no reconnection at this
//! layer.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod service;
pub mod transport;

mod reactor;
mod syncer;

pub use config::{ConfigError, SyncConfig};
pub use error::FabricError;
pub use service::serve;
pub use syncer::Syncer;

pub use fabric_core::{LocalRegistry, MessageStore, Receiver, Reporter, StoreDiagnostics};
pub use fabric_types::{
    ComponentId, Frame, Join, MessageBatch, MessageKey, NodeId, SyncMessage, Welcome,
    PROTOCOL_VERSION,
};
