//! Error types for fabric-sync.

use thiserror::Error;

use crate::transport::TransportError;
use fabric_types::WireError;

/// Top-level error type for fabric operations.
#[derive(Debug, Error)]
pub enum FabricError {
    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame encode/decode failure.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// The Join/Welcome exchange did not complete.
    #[error("handshake failed: {reason}")]
    Handshake {
        /// Why the handshake was rejected.
        reason: String,
    },

    /// `follow` was called a second time on a fabric that already has an
    /// upstream link.
    #[error("already following a hub")]
    AlreadyFollowing,

    /// The fabric's driver task is gone (the fabric was shut down).
    #[error("fabric is stopped")]
    Stopped,
}

impl FabricError {
    pub(crate) fn handshake(reason: impl Into<String>) -> Self {
        Self::Handshake {
            reason: reason.into(),
        }
    }
}
