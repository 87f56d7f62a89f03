//! TCP transport.
//!
//! Frames are a 4-byte big-endian length prefix followed by the payload;
//! frames over [`MAX_FRAME_SIZE`](super::MAX_FRAME_SIZE) are rejected.

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use super::{
    Acceptor, BoxReceiver, BoxSender, Connector, LinkReceiver, LinkSender, TransportError,
    MAX_FRAME_SIZE,
};

/// Dials one remote address.
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    /// Create a connector for the given `host:port` address.
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<(BoxSender, BoxReceiver), TransportError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let _ = stream.set_nodelay(true);
        Ok(split(stream))
    }
}

/// Accepts inbound TCP streams.
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    /// Bind to the given address (use port 0 to let the OS pick).
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
        })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    async fn accept(&mut self) -> Result<(BoxSender, BoxReceiver), TransportError> {
        let (stream, _peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::AcceptFailed(e.to_string()))?;
        let _ = stream.set_nodelay(true);
        Ok(split(stream))
    }
}

fn split(stream: TcpStream) -> (BoxSender, BoxReceiver) {
    let (read, write) = stream.into_split();
    (
        Box::new(TcpSender { write }),
        Box::new(TcpReceiver { read }),
    )
}

struct TcpSender {
    write: OwnedWriteHalf,
}

#[async_trait]
impl LinkSender for TcpSender {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if frame.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                len: frame.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let len = (frame.len() as u32).to_be_bytes();
        self.write
            .write_all(&len)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.write
            .write_all(frame)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.write
            .shutdown()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

struct TcpReceiver {
    read: OwnedReadHalf,
}

#[async_trait]
impl LinkReceiver for TcpReceiver {
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        // Any read error on TCP means the stream is done for.
        let mut len_buf = [0u8; 4];
        self.read
            .read_exact(&mut len_buf)
            .await
            .map_err(|_| TransportError::ConnectionClosed)?;
        let len = u32::from_be_bytes(len_buf) as usize;

        if len > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                len,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut buf = vec![0u8; len];
        self.read
            .read_exact(&mut buf)
            .await
            .map_err(|_| TransportError::ConnectionClosed)?;
        Ok(buf)
    }
}
