//! # fabric-types
//!
//! Wire format types for the state-fabric cluster synchronization protocol.
//!
//! This crate provides the foundational types used across all fabric crates:
//! - [`NodeId`], [`ComponentId`] - identity types
//! - [`SyncMessage`], [`MessageBatch`] - component snapshots and their wire frame
//! - [`Frame`] - the stream protocol (handshake + batches)
//! - [`WireError`] - codec errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod messages;

pub use error::WireError;
pub use ids::{ComponentId, NodeId};
pub use messages::{Frame, Join, MessageBatch, MessageKey, SyncMessage, Welcome, PROTOCOL_VERSION};
