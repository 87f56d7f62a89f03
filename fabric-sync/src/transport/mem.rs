//! In-process transport for testing.
//!
//! Streams are unbounded channel pairs; a [`listener`] gives you a
//! connector/acceptor pair so a whole fabric can run inside one process.
//! [`FaultInjector`] forces one-shot receive failures for exercising the
//! transient-error path.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::{Acceptor, BoxReceiver, BoxSender, Connector, LinkReceiver, LinkSender, TransportError};

/// Create a paired in-memory acceptor and connector.
///
/// Every [`Connector::connect`] call produces a fresh duplex stream whose
/// other end pops out of the acceptor.
pub fn listener() -> (MemAcceptor, MemConnector) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MemAcceptor { incoming: rx }, MemConnector { listener: tx })
}

/// Create one directly wired duplex stream: `(left end, right end)`.
pub fn pair() -> ((BoxSender, BoxReceiver), (BoxSender, BoxReceiver)) {
    let (left, right, _faults) = pair_with_faults();
    (left, right)
}

/// Like [`pair`], plus a [`FaultInjector`] acting on the *left* end's
/// receiver.
pub fn pair_with_faults() -> (
    (BoxSender, BoxReceiver),
    (BoxSender, BoxReceiver),
    FaultInjector,
) {
    let (left_tx, right_rx) = mpsc::unbounded_channel();
    let (right_tx, left_rx) = mpsc::unbounded_channel();
    let faults = FaultInjector::default();

    let left: (BoxSender, BoxReceiver) = (
        Box::new(MemSender {
            tx: Some(left_tx),
        }),
        Box::new(MemReceiver {
            rx: left_rx,
            faults: faults.clone(),
        }),
    );
    let right: (BoxSender, BoxReceiver) = (
        Box::new(MemSender {
            tx: Some(right_tx),
        }),
        Box::new(MemReceiver {
            rx: right_rx,
            faults: FaultInjector::default(),
        }),
    );
    (left, right, faults)
}

/// Forces the next `recv` on the associated receiver to fail with a
/// transient error.
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    next_recv_error: Arc<Mutex<Option<String>>>,
}

impl FaultInjector {
    /// Make the next `recv()` fail with the given message.
    pub fn fail_next_recv(&self, error: &str) {
        *self.next_recv_error.lock().unwrap() = Some(error.to_string());
    }

    fn take(&self) -> Option<String> {
        self.next_recv_error.lock().unwrap().take()
    }
}

/// Acceptor end of [`listener`].
pub struct MemAcceptor {
    incoming: mpsc::UnboundedReceiver<(BoxSender, BoxReceiver)>,
}

#[async_trait]
impl Acceptor for MemAcceptor {
    async fn accept(&mut self) -> Result<(BoxSender, BoxReceiver), TransportError> {
        self.incoming
            .recv()
            .await
            .ok_or(TransportError::ConnectionClosed)
    }
}

/// Connector end of [`listener`]. Cloneable; every clone dials the same
/// acceptor.
#[derive(Clone)]
pub struct MemConnector {
    listener: mpsc::UnboundedSender<(BoxSender, BoxReceiver)>,
}

#[async_trait]
impl Connector for MemConnector {
    async fn connect(&self) -> Result<(BoxSender, BoxReceiver), TransportError> {
        let (local, remote) = pair();
        self.listener
            .send(remote)
            .map_err(|_| TransportError::ConnectionFailed("listener closed".to_string()))?;
        Ok(local)
    }
}

struct MemSender {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

#[async_trait]
impl LinkSender for MemSender {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        tx.send(frame.to_vec())
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

struct MemReceiver {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    faults: FaultInjector,
}

#[async_trait]
impl LinkReceiver for MemReceiver {
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        if let Some(error) = self.faults.take() {
            return Err(TransportError::ReceiveFailed(error));
        }
        self.rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }
}
