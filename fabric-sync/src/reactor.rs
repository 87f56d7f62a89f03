//! Per-link reactor: the steady-state state machine driving one
//! bidirectional stream.
//!
//! Hub-side and follower-side links share this loop; they differ only in how
//! the peer id was learned during the handshake, which happens before a
//! reactor exists. Each reactor runs three cooperating tasks:
//!
//! - *reader*: await an inbound frame, post its messages to the driver,
//!   re-arm. Transient receive failures re-arm; terminal ones end the link.
//! - *writer*: ask the driver to collect (poll local reporters, drain the
//!   store for this peer), write a batch if anything is pending, then sleep
//!   one cool-down. A shutdown signal during the cool-down ends the link
//!   without re-arming.
//! - *supervisor*: whichever of the two exits first takes the other down and
//!   posts a generation-tagged detach so the driver can drop the peer entry
//!   and its viewer sub-map — unless a newer reactor has displaced this one.

use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

use crate::syncer::Command;
use crate::transport::{BoxReceiver, BoxSender};
use fabric_types::{Frame, MessageBatch, NodeId};

/// Driver-side handle to a running reactor.
pub(crate) struct ReactorHandle {
    pub(crate) generation: u64,
    shutdown: watch::Sender<bool>,
}

impl ReactorHandle {
    /// Ask the reactor to finish gracefully. Also happens implicitly when
    /// the handle is dropped.
    pub(crate) fn finish(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Everything a reactor needs to run.
pub(crate) struct ReactorContext {
    pub(crate) peer: NodeId,
    pub(crate) generation: u64,
    pub(crate) cooldown: Duration,
    pub(crate) sender: BoxSender,
    pub(crate) receiver: BoxReceiver,
    pub(crate) commands: mpsc::UnboundedSender<Command>,
}

/// Spawn the reactor tasks for one established link.
pub(crate) fn spawn(context: ReactorContext) -> ReactorHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = ReactorHandle {
        generation: context.generation,
        shutdown: shutdown_tx,
    };
    tokio::spawn(run(context, shutdown_rx));
    handle
}

async fn run(context: ReactorContext, shutdown: watch::Receiver<bool>) {
    let ReactorContext {
        peer,
        generation,
        cooldown,
        sender,
        receiver,
        commands,
    } = context;

    let mut reader = tokio::spawn(read_loop(
        peer.clone(),
        receiver,
        commands.clone(),
        shutdown.clone(),
    ));
    let mut writer = tokio::spawn(write_loop(
        peer.clone(),
        cooldown,
        sender,
        commands.clone(),
        shutdown,
    ));

    // First side to finish ends the link.
    tokio::select! {
        _ = &mut reader => writer.abort(),
        _ = &mut writer => reader.abort(),
    }

    tracing::info!(peer = %peer, "link closed");
    let _ = commands.send(Command::Detach { peer, generation });
}

async fn read_loop(
    peer: NodeId,
    mut receiver: BoxReceiver,
    commands: mpsc::UnboundedSender<Command>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let frame = tokio::select! {
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => return,
            frame = receiver.recv() => frame,
        };

        match frame {
            Ok(bytes) => match Frame::from_bytes(&bytes) {
                Ok(Frame::Batch(batch)) => {
                    let posted = commands.send(Command::Ingest {
                        from: peer.clone(),
                        messages: batch.messages,
                    });
                    if posted.is_err() {
                        return;
                    }
                }
                Ok(_) => {
                    tracing::warn!(peer = %peer, "unexpected handshake frame mid-stream");
                    return;
                }
                Err(error) => {
                    tracing::warn!(peer = %peer, %error, "undecodable frame");
                    return;
                }
            },
            Err(error) if error.is_terminal() => {
                tracing::debug!(peer = %peer, %error, "read side closed");
                return;
            }
            Err(error) => {
                tracing::warn!(peer = %peer, %error, "transient read failure, re-arming");
            }
        }
    }
}

async fn write_loop(
    peer: NodeId,
    cooldown: Duration,
    mut sender: BoxSender,
    commands: mpsc::UnboundedSender<Command>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let (reply_tx, reply_rx) = oneshot::channel();
        let posted = commands.send(Command::Collect {
            peer: peer.clone(),
            reply: reply_tx,
        });
        if posted.is_err() {
            return;
        }
        let Ok(pending) = reply_rx.await else {
            // Driver is gone; the fabric is shutting down.
            return;
        };

        if !pending.is_empty() {
            let batch = Frame::Batch(MessageBatch::from_shared(&pending));
            let bytes = match batch.to_bytes() {
                Ok(bytes) => bytes,
                Err(error) => {
                    tracing::error!(peer = %peer, %error, "failed to encode batch");
                    return;
                }
            };
            if let Err(error) = sender.send(&bytes).await {
                tracing::debug!(peer = %peer, %error, "write side closed");
                return;
            }
            tracing::trace!(peer = %peer, count = pending.len(), "batch written");
        }

        tokio::select! {
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
                let _ = sender.close().await;
                return;
            }
            _ = tokio::time::sleep(cooldown) => {}
        }
    }
}
