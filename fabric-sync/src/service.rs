//! Hub-side accept loop.
//!
//! Glue between an [`Acceptor`] and the [`Syncer`]: every inbound stream
//! must open with a valid `Join` frame (the original protocol's `node_id`
//! request metadata); the hub answers with `Welcome` and hands the stream to
//! [`Syncer::accept`]. Streams that fail validation are dropped before any
//! reactor exists.

use std::sync::Arc;
use tokio::time::timeout;

use crate::error::FabricError;
use crate::syncer::Syncer;
use crate::transport::{Acceptor, BoxReceiver, BoxSender};
use fabric_types::{Frame, Welcome, PROTOCOL_VERSION};

/// Serve inbound streams on `acceptor` until it fails.
///
/// Each stream's handshake runs in its own task so a stalled peer cannot
/// block the accept loop.
pub async fn serve(syncer: Arc<Syncer>, mut acceptor: impl Acceptor) -> Result<(), FabricError> {
    loop {
        let (sender, receiver) = acceptor.accept().await?;
        let syncer = Arc::clone(&syncer);
        tokio::spawn(async move {
            if let Err(error) = accept_stream(&syncer, sender, receiver).await {
                tracing::warn!(%error, "inbound stream rejected");
            }
        });
    }
}

async fn accept_stream(
    syncer: &Syncer,
    mut sender: BoxSender,
    mut receiver: BoxReceiver,
) -> Result<(), FabricError> {
    let bytes = timeout(syncer.config().handshake_timeout(), receiver.recv())
        .await
        .map_err(|_| FabricError::handshake("timed out waiting for join"))??;

    let Frame::Join(join) = Frame::from_bytes(&bytes)? else {
        return Err(FabricError::handshake("stream did not open with a join frame"));
    };
    if join.protocol != PROTOCOL_VERSION {
        return Err(FabricError::handshake(format!(
            "protocol mismatch: peer speaks v{}, we speak v{}",
            join.protocol, PROTOCOL_VERSION
        )));
    }
    if join.node_id.is_empty() {
        return Err(FabricError::handshake("join carries an empty node id"));
    }
    if join.node_id == *syncer.node_id() {
        return Err(FabricError::handshake("peer reports our own node id"));
    }

    let welcome = Frame::Welcome(Welcome {
        protocol: PROTOCOL_VERSION,
        node_id: syncer.node_id().clone(),
    });
    sender.send(&welcome.to_bytes()?).await?;

    tracing::info!(peer = %join.node_id, "follower accepted");
    syncer.accept(join.node_id, sender, receiver)
}
