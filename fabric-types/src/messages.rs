//! Protocol frames for the state fabric.
//!
//! A link carries MessagePack-encoded [`Frame`]s. The first frame in each
//! direction is the handshake ([`Join`] from the initiator, [`Welcome`] from
//! the acceptor); everything after is [`MessageBatch`]es.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{ComponentId, NodeId, WireError};

/// Protocol version spoken by this build. Peers with a different version are
/// rejected at the handshake.
pub const PROTOCOL_VERSION: u8 = 1;

/// Key of a snapshot in the routing table: who produced it, for what.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageKey {
    /// Node whose reporter produced the message.
    pub origin: NodeId,
    /// Component the message belongs to.
    pub component: ComponentId,
}

/// A component snapshot, immutable once produced.
///
/// Versions are monotonically non-decreasing per `(origin, component)`
/// producer; the fabric only ever moves forward to strictly newer versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMessage {
    /// Node whose reporter produced this message.
    pub origin: NodeId,
    /// Component this message belongs to.
    pub component: ComponentId,
    /// Producer version; larger is newer.
    pub version: u64,
    /// Opaque snapshot payload.
    pub payload: Bytes,
}

impl SyncMessage {
    /// The routing-table key of this message.
    pub fn key(&self) -> MessageKey {
        MessageKey {
            origin: self.origin.clone(),
            component: self.component,
        }
    }
}

/// An ordered batch of snapshots; the steady-state wire frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBatch {
    /// The snapshots in this batch. Receivers treat the batch as a set.
    pub messages: Vec<SyncMessage>,
}

impl MessageBatch {
    /// Build a batch from shared store entries. Clones are cheap: ids and
    /// payloads are refcounted.
    pub fn from_shared(messages: &[Arc<SyncMessage>]) -> Self {
        Self {
            messages: messages.iter().map(|m| (**m).clone()).collect(),
        }
    }

    /// Whether the batch carries nothing.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// First frame sent by the initiating side of a link.
///
/// Carries what the original protocol put in request metadata: the sender's
/// node id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    /// Protocol version of the initiator.
    pub protocol: u8,
    /// Node id of the initiator.
    pub node_id: NodeId,
}

/// First frame sent back by the accepting side of a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Welcome {
    /// Protocol version of the acceptor.
    pub protocol: u8,
    /// Node id of the acceptor.
    pub node_id: NodeId,
}

/// Everything a link can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Handshake, initiator side.
    Join(Join),
    /// Handshake, acceptor side.
    Welcome(Welcome),
    /// Steady-state snapshot batch.
    Batch(MessageBatch),
}

impl Frame {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec(self).map_err(WireError::Encode)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> NodeId {
        NodeId::from_name(name).unwrap()
    }

    #[test]
    fn batch_frame_roundtrip() {
        let frame = Frame::Batch(MessageBatch {
            messages: vec![SyncMessage {
                origin: node("a"),
                component: ComponentId::RESOURCE_MANAGER,
                version: 7,
                payload: Bytes::from_static(b"cpu=4"),
            }],
        });

        let bytes = frame.to_bytes().unwrap();
        let restored = Frame::from_bytes(&bytes).unwrap();
        assert_eq!(frame, restored);
    }

    #[test]
    fn join_frame_roundtrip() {
        let frame = Frame::Join(Join {
            protocol: PROTOCOL_VERSION,
            node_id: node("follower-1"),
        });

        let restored = Frame::from_bytes(&frame.to_bytes().unwrap()).unwrap();
        match restored {
            Frame::Join(join) => {
                assert_eq!(join.protocol, PROTOCOL_VERSION);
                assert_eq!(join.node_id, node("follower-1"));
            }
            other => panic!("expected Join, got {other:?}"),
        }
    }

    #[test]
    fn unknown_component_survives_the_wire() {
        let frame = Frame::Batch(MessageBatch {
            messages: vec![SyncMessage {
                origin: node("a"),
                component: ComponentId::from_raw(99),
                version: 1,
                payload: Bytes::new(),
            }],
        });

        let restored = Frame::from_bytes(&frame.to_bytes().unwrap()).unwrap();
        match restored {
            Frame::Batch(batch) => assert_eq!(batch.messages[0].component.slot(), None),
            other => panic!("expected Batch, got {other:?}"),
        }
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(Frame::from_bytes(&[0xde, 0xad, 0xbe, 0xef]).is_err());
    }

    #[test]
    fn from_shared_preserves_contents() {
        let msg = Arc::new(SyncMessage {
            origin: node("a"),
            component: ComponentId::CLUSTER_RESOURCE,
            version: 3,
            payload: Bytes::from_static(b"x"),
        });
        let batch = MessageBatch::from_shared(&[msg.clone()]);
        assert_eq!(batch.messages.len(), 1);
        assert_eq!(batch.messages[0], *msg);
    }
}
