//! Transport abstraction for fabric links.
//!
//! The original protocol rode on a streaming RPC runtime; here it is
//! consumed through a narrow interface over bidirectional byte streams.
//! A [`Connector`] opens an outbound stream, an [`Acceptor`] yields inbound
//! ones, and each stream splits into a [`LinkSender`] and a [`LinkReceiver`]
//! so the reactor's reader and writer can run independently.
//!
//! Two implementations ship with the crate:
//! - [`mem`]: in-process channel-backed streams for tests
//! - [`tcp`]: Tokio TCP with length-prefixed frames

pub mod mem;
pub mod tcp;

use async_trait::async_trait;
use thiserror::Error;

/// Maximum encoded frame size a link will accept.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The stream is gone; nothing more will flow.
    #[error("connection closed")]
    ConnectionClosed,

    /// Accepting an inbound stream failed.
    #[error("accept failed: {0}")]
    AcceptFailed(String),

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// A frame exceeded [`MAX_FRAME_SIZE`].
    #[error("frame too large: {len} > {max}")]
    FrameTooLarge {
        /// Observed frame length.
        len: usize,
        /// The configured cap.
        max: usize,
    },
}

impl TransportError {
    /// Whether the link is beyond recovery. Terminal read errors tear the
    /// reactor down; everything else is treated as a spurious wakeup and
    /// the read is re-armed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionClosed | TransportError::FrameTooLarge { .. }
        )
    }
}

/// Outbound half of one bidirectional stream.
#[async_trait]
pub trait LinkSender: Send {
    /// Write one opaque frame.
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Close the outbound half gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Inbound half of one bidirectional stream.
#[async_trait]
pub trait LinkReceiver: Send {
    /// Read the next opaque frame. Blocks until a frame arrives or the
    /// stream closes.
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError>;
}

/// Boxed outbound half.
pub type BoxSender = Box<dyn LinkSender>;
/// Boxed inbound half.
pub type BoxReceiver = Box<dyn LinkReceiver>;

/// Opens outbound streams to one remote endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a new bidirectional stream.
    async fn connect(&self) -> Result<(BoxSender, BoxReceiver), TransportError>;
}

/// Yields inbound bidirectional streams.
#[async_trait]
pub trait Acceptor: Send {
    /// Wait for the next inbound stream.
    async fn accept(&mut self) -> Result<(BoxSender, BoxReceiver), TransportError>;
}
