//! Codec errors for the state fabric wire format.

use thiserror::Error;

/// Errors produced when encoding or decoding wire frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// MessagePack serialization failed.
    #[error("frame encode failed: {0}")]
    Encode(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed.
    #[error("frame decode failed: {0}")]
    Decode(#[source] rmp_serde::decode::Error),
}
