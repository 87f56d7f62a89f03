//! Identity types for the state fabric.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A unique identifier for a node in the cluster.
///
/// Opaque non-empty byte string, stable for the lifetime of the fabric.
/// Cheap to clone; displayed as the raw string when printable ASCII,
/// URL-safe base64 otherwise.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(Bytes);

impl NodeId {
    /// Create a NodeId from raw bytes. Returns `None` for an empty slice.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            None
        } else {
            Some(Self(Bytes::copy_from_slice(bytes)))
        }
    }

    /// Create a NodeId from a string label. Returns `None` for an empty string.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::from_bytes(name.as_bytes())
    }

    /// Create a new random NodeId (16 bytes).
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(Bytes::copy_from_slice(&bytes))
    }

    /// Get the raw bytes of this NodeId.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether the id is empty. Empty ids are rejected at the handshake;
    /// a deserialized frame may still carry one.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_graphic()) => f.write_str(s),
            _ => write!(f, "{}", URL_SAFE_NO_PAD.encode(&self.0)),
        }
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self)
    }
}

/// Identifier of a synchronized component.
///
/// The component set is closed and small; [`ComponentId::COUNT`] is the
/// compile-time size of the registry slot arrays. The wire carries the raw
/// integer, so values outside the known set deserialize fine — they simply
/// map to no registry slot and are dropped on delivery.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(u8);

impl ComponentId {
    /// Resource manager snapshots.
    pub const RESOURCE_MANAGER: ComponentId = ComponentId(0);
    /// Cluster resource view snapshots.
    pub const CLUSTER_RESOURCE: ComponentId = ComponentId(1);

    /// Number of known components (the registry slot count).
    pub const COUNT: usize = 2;

    /// Create a ComponentId from its wire integer.
    pub fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// The wire integer of this component.
    pub fn raw(&self) -> u8 {
        self.0
    }

    /// Registry slot index, or `None` if this id is outside the known set.
    pub fn slot(&self) -> Option<usize> {
        let idx = self.0 as usize;
        (idx < Self::COUNT).then_some(idx)
    }

    /// Iterate over every known component.
    pub fn all() -> impl Iterator<Item = ComponentId> {
        (0..Self::COUNT as u8).map(ComponentId)
    }

    fn name(&self) -> Option<&'static str> {
        match *self {
            Self::RESOURCE_MANAGER => Some("resource-manager"),
            Self::CLUSTER_RESOURCE => Some("cluster-resource"),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "component-{}", self.0),
        }
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self)
    }
}
