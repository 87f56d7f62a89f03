//! The per-node routing table.
//!
//! The store tracks, for every connected peer ("viewer"), which snapshots
//! that peer has not yet been sent. An entry exists per `(viewer, key)`
//! rather than per `(viewer, message)`, so a rapid succession of updates for
//! one key collapses to latest-wins and the table stays bounded by
//! `|viewers| · |origins| · K`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use fabric_types::{MessageKey, NodeId, SyncMessage};

/// Routing table: `viewer -> (origin, component) -> pending message`.
///
/// Besides the per-viewer pending maps, the store keeps a current-state
/// cache holding the newest accepted message per key. The cache is the
/// version gate for ingest and the seed for newly added viewers, so a peer
/// that (re)connects receives the full current cluster state on its first
/// write tick.
#[derive(Default)]
pub struct MessageStore {
    viewers: HashMap<NodeId, HashMap<MessageKey, Arc<SyncMessage>>>,
    current: HashMap<MessageKey, Arc<SyncMessage>>,
}

impl MessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a viewer, seeding its queue with the current state.
    ///
    /// Keys originated by the viewer itself are skipped: a node is never
    /// told about itself. If the viewer already exists (a reconnect that
    /// displaced the old link), its queue is reset to the fresh seed.
    pub fn add_viewer(&mut self, viewer: NodeId) {
        let seed: HashMap<MessageKey, Arc<SyncMessage>> = self
            .current
            .iter()
            .filter(|(key, _)| key.origin != viewer)
            .map(|(key, message)| (key.clone(), message.clone()))
            .collect();
        tracing::debug!(viewer = %viewer, seeded = seed.len(), "viewer added");
        self.viewers.insert(viewer, seed);
    }

    /// Stop tracking a viewer and drop everything queued for it.
    pub fn remove_viewer(&mut self, viewer: &NodeId) {
        if self.viewers.remove(viewer).is_some() {
            tracing::debug!(viewer = %viewer, "viewer removed");
        }
    }

    /// Whether the given node is currently tracked as a viewer.
    pub fn contains_viewer(&self, viewer: &NodeId) -> bool {
        self.viewers.contains_key(viewer)
    }

    /// Ids of all tracked viewers.
    pub fn viewers(&self) -> impl Iterator<Item = &NodeId> {
        self.viewers.keys()
    }

    /// Number of messages currently queued for a viewer.
    pub fn pending(&self, viewer: &NodeId) -> usize {
        self.viewers.get(viewer).map_or(0, HashMap::len)
    }

    /// Integrate one message received from `from` (use the local node id for
    /// self-produced snapshots).
    ///
    /// Returns `true` if the message was strictly newer than anything known
    /// for its key and was queued for the relevant viewers; `false` if it was
    /// stale and discarded. Queued viewers exclude the message's origin (it
    /// already knows) and `from` (no echo back to the sender).
    pub fn ingest(&mut self, from: &NodeId, message: Arc<SyncMessage>) -> bool {
        let key = message.key();
        if let Some(known) = self.current.get(&key) {
            if message.version <= known.version {
                tracing::trace!(
                    origin = %key.origin,
                    component = %key.component,
                    version = message.version,
                    known = known.version,
                    "stale message discarded"
                );
                return false;
            }
        }

        for (viewer, pending) in &mut self.viewers {
            if *viewer == key.origin || viewer == from {
                continue;
            }
            pending.insert(key.clone(), message.clone());
        }
        self.current.insert(key, message);
        true
    }

    /// Take everything queued for `viewer`.
    ///
    /// The returned order is unspecified; callers treat the batch as a set.
    /// Draining twice without an intervening ingest returns empty.
    pub fn drain(&mut self, viewer: &NodeId) -> Vec<Arc<SyncMessage>> {
        match self.viewers.get_mut(viewer) {
            Some(pending) => pending.drain().map(|(_, message)| message).collect(),
            None => Vec::new(),
        }
    }

    /// Snapshot of the table for the diagnostic dump.
    pub fn diagnostics(&self) -> StoreDiagnostics {
        let mut viewers: Vec<ViewerDiagnostics> = self
            .viewers
            .iter()
            .map(|(viewer, pending)| {
                let mut entries: Vec<(MessageKey, u64)> = pending
                    .iter()
                    .map(|(key, message)| (key.clone(), message.version))
                    .collect();
                entries.sort();
                ViewerDiagnostics {
                    viewer: viewer.clone(),
                    entries,
                }
            })
            .collect();
        viewers.sort_by(|a, b| a.viewer.cmp(&b.viewer));
        StoreDiagnostics { viewers }
    }
}

/// Pending entries for one viewer, as reported by [`MessageStore::diagnostics`].
#[derive(Debug, Clone)]
pub struct ViewerDiagnostics {
    /// The viewer these entries are queued for.
    pub viewer: NodeId,
    /// `(origin, component) -> version` of every pending message.
    pub entries: Vec<(MessageKey, u64)>,
}

/// Renderable snapshot of the routing table.
#[derive(Debug, Clone)]
pub struct StoreDiagnostics {
    /// One record per tracked viewer, sorted by viewer id.
    pub viewers: Vec<ViewerDiagnostics>,
}

impl fmt::Display for StoreDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---- message store ----")?;
        for record in &self.viewers {
            writeln!(f, "viewer {}: {} pending", record.viewer, record.entries.len())?;
            for (key, version) in &record.entries {
                writeln!(f, "  {}/{} -> v{}", key.origin, key.component, version)?;
            }
        }
        Ok(())
    }
}
