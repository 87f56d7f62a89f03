//! The syncer facade and its single-writer driver task.
//!
//! All mutable fabric state — the message store, the local registry, the
//! peer table — is owned by one driver task and mutated only there. The
//! facade and the per-link reactors talk to it over an unbounded command
//! channel, which serializes every mutation without locks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::config::SyncConfig;
use crate::error::FabricError;
use crate::reactor::{self, ReactorContext, ReactorHandle};
use crate::transport::{BoxReceiver, BoxSender, Connector};
use fabric_core::{LocalRegistry, MessageStore, Receiver, Reporter, StoreDiagnostics};
use fabric_types::{
    ComponentId, Frame, Join, MessageBatch, NodeId, SyncMessage, PROTOCOL_VERSION,
};

/// Work posted to the driver task.
pub(crate) enum Command {
    Register {
        component: ComponentId,
        reporter: Option<Box<dyn Reporter>>,
        receiver: Option<Box<dyn Receiver>>,
    },
    Ingest {
        from: NodeId,
        messages: Vec<SyncMessage>,
    },
    /// Poll local reporters, then drain everything pending for `peer`.
    /// One writer tick of that peer's reactor.
    Collect {
        peer: NodeId,
        reply: oneshot::Sender<Vec<Arc<SyncMessage>>>,
    },
    /// Drain without polling reporters (the `SyncMessages` surface).
    Drain {
        peer: NodeId,
        reply: oneshot::Sender<Vec<Arc<SyncMessage>>>,
    },
    Attach {
        peer: NodeId,
        sender: BoxSender,
        receiver: BoxReceiver,
    },
    Detach {
        peer: NodeId,
        generation: u64,
    },
    Peers {
        reply: oneshot::Sender<Vec<NodeId>>,
    },
    Diagnostics {
        reply: oneshot::Sender<StoreDiagnostics>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// The top-level fabric object.
///
/// Owns (through its driver task) the message store, the local registry and
/// the peer table. Created once per process with a fixed node id; torn down
/// with [`Syncer::shutdown`].
pub struct Syncer {
    node_id: NodeId,
    config: SyncConfig,
    commands: mpsc::UnboundedSender<Command>,
    following: AtomicBool,
}

impl Syncer {
    /// Create a fabric for `node_id` and spawn its driver task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(node_id: NodeId, config: SyncConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = Driver {
            node_id: node_id.clone(),
            cooldown: config.cooldown(),
            store: MessageStore::new(),
            registry: LocalRegistry::new(),
            peers: HashMap::new(),
            commands: tx.clone(),
            next_generation: 0,
        };
        tokio::spawn(driver.run(rx));
        Self {
            node_id,
            config,
            commands: tx,
            following: AtomicBool::new(false),
        }
    }

    /// This node's id.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// The fabric configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Bind a component slot. Reporter may be `None` (consume-only);
    /// receiver may be `None` (produce-only).
    ///
    /// Must happen before [`follow`](Self::follow) or the first accepted
    /// stream for components whose snapshots should synchronize from
    /// startup; late registration produces/consumes from that point on.
    /// Binding the same slot twice is a programming error and aborts the
    /// driver.
    pub fn register(
        &self,
        component: ComponentId,
        reporter: Option<Box<dyn Reporter>>,
        receiver: Option<Box<dyn Receiver>>,
    ) {
        let _ = self.commands.send(Command::Register {
            component,
            reporter,
            receiver,
        });
    }

    /// Establish the upstream link to a hub. At most one succeeds per
    /// fabric; a failed attempt may be retried.
    ///
    /// Performs the Join/Welcome handshake, then registers the hub as a
    /// viewer and starts the steady-state reactor. Returns the hub's node
    /// id.
    pub async fn follow(&self, connector: &dyn Connector) -> Result<NodeId, FabricError> {
        if self.following.swap(true, Ordering::SeqCst) {
            return Err(FabricError::AlreadyFollowing);
        }
        match self.follow_inner(connector).await {
            Ok(hub) => Ok(hub),
            Err(error) => {
                self.following.store(false, Ordering::SeqCst);
                Err(error)
            }
        }
    }

    async fn follow_inner(&self, connector: &dyn Connector) -> Result<NodeId, FabricError> {
        let (mut sender, mut receiver) = connector.connect().await?;

        let join = Frame::Join(Join {
            protocol: PROTOCOL_VERSION,
            node_id: self.node_id.clone(),
        });
        sender.send(&join.to_bytes()?).await?;

        let bytes = timeout(self.config.handshake_timeout(), receiver.recv())
            .await
            .map_err(|_| FabricError::handshake("timed out waiting for welcome"))??;
        let Frame::Welcome(welcome) = Frame::from_bytes(&bytes)? else {
            return Err(FabricError::handshake("expected welcome frame"));
        };
        if welcome.protocol != PROTOCOL_VERSION {
            return Err(FabricError::handshake(format!(
                "protocol mismatch: hub speaks v{}, we speak v{}",
                welcome.protocol, PROTOCOL_VERSION
            )));
        }
        if welcome.node_id.is_empty() {
            return Err(FabricError::handshake("welcome carries an empty node id"));
        }
        if welcome.node_id == self.node_id {
            return Err(FabricError::handshake("hub reports our own node id"));
        }

        tracing::info!(hub = %welcome.node_id, "following hub");
        self.accept(welcome.node_id.clone(), sender, receiver)?;
        Ok(welcome.node_id)
    }

    /// Attach an established stream for `peer` and start its reactor.
    ///
    /// Used by the hub service after a validated handshake and by
    /// [`follow`](Self::follow). If a reactor already exists for this peer
    /// id, the new one displaces it and the old is asked to finish.
    pub fn accept(
        &self,
        peer: NodeId,
        sender: BoxSender,
        receiver: BoxReceiver,
    ) -> Result<(), FabricError> {
        self.commands
            .send(Command::Attach {
                peer,
                sender,
                receiver,
            })
            .map_err(|_| FabricError::Stopped)
    }

    /// Integrate one message as if received from `from`. Use the local node
    /// id for self-produced messages.
    pub fn update(&self, from: NodeId, message: SyncMessage) {
        let _ = self.commands.send(Command::Ingest {
            from,
            messages: vec![message],
        });
    }

    /// Integrate a whole batch received from `from`.
    pub fn update_batch(&self, from: NodeId, batch: MessageBatch) {
        let _ = self.commands.send(Command::Ingest {
            from,
            messages: batch.messages,
        });
    }

    /// Take everything currently queued for `peer`.
    ///
    /// This is the store's drain, exposed for observation; note that a live
    /// reactor for `peer` drains concurrently on its own ticks.
    pub async fn sync_messages(&self, peer: &NodeId) -> Vec<Arc<SyncMessage>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let posted = self.commands.send(Command::Drain {
            peer: peer.clone(),
            reply: reply_tx,
        });
        if posted.is_err() {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    /// Ids of every peer with a live reactor.
    pub async fn peers(&self) -> Vec<NodeId> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(Command::Peers { reply: reply_tx }).is_err() {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    /// Snapshot of the routing table for the diagnostic dump.
    pub async fn diagnostics(&self) -> StoreDiagnostics {
        let (reply_tx, reply_rx) = oneshot::channel();
        let posted = self
            .commands
            .send(Command::Diagnostics { reply: reply_tx });
        if posted.is_err() {
            return StoreDiagnostics { viewers: Vec::new() };
        }
        reply_rx.await.unwrap_or(StoreDiagnostics {
            viewers: Vec::new(),
        })
    }

    /// Tear the fabric down: finish every reactor and stop the driver.
    /// Commands posted before this call are drained first.
    pub async fn shutdown(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply: reply_tx }).is_ok() {
            let _ = reply_rx.await;
        }
    }
}

/// The single-writer owner of all fabric state.
struct Driver {
    node_id: NodeId,
    cooldown: std::time::Duration,
    store: MessageStore,
    registry: LocalRegistry,
    peers: HashMap<NodeId, ReactorHandle>,
    commands: mpsc::UnboundedSender<Command>,
    next_generation: u64,
}

impl Driver {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Register {
                    component,
                    reporter,
                    receiver,
                } => self.registry.register(component, reporter, receiver),
                Command::Ingest { from, messages } => self.ingest(from, messages),
                Command::Collect { peer, reply } => {
                    self.poll_reporters();
                    let _ = reply.send(self.store.drain(&peer));
                }
                Command::Drain { peer, reply } => {
                    let _ = reply.send(self.store.drain(&peer));
                }
                Command::Attach {
                    peer,
                    sender,
                    receiver,
                } => self.attach(peer, sender, receiver),
                Command::Detach { peer, generation } => self.detach(peer, generation),
                Command::Peers { reply } => {
                    let _ = reply.send(self.peers.keys().cloned().collect());
                }
                Command::Diagnostics { reply } => {
                    let _ = reply.send(self.store.diagnostics());
                }
                Command::Shutdown { reply } => {
                    for (peer, handle) in self.peers.drain() {
                        tracing::debug!(peer = %peer, "finishing link on shutdown");
                        handle.finish();
                    }
                    let _ = reply.send(());
                    break;
                }
            }
        }
        tracing::debug!(node = %self.node_id, "driver stopped");
    }

    fn ingest(&mut self, from: NodeId, messages: Vec<SyncMessage>) {
        let inbound = from != self.node_id;
        for message in messages {
            let message = Arc::new(message);
            let fresh = self.store.ingest(&from, message.clone());
            if fresh && inbound {
                self.registry.deliver(&message);
            }
        }
    }

    fn poll_reporters(&mut self) {
        for snapshot in self.registry.snapshots() {
            let from = self.node_id.clone();
            self.store.ingest(&from, Arc::new(snapshot));
        }
    }

    fn attach(&mut self, peer: NodeId, sender: BoxSender, receiver: BoxReceiver) {
        self.next_generation += 1;
        let generation = self.next_generation;

        if let Some(old) = self.peers.remove(&peer) {
            tracing::info!(peer = %peer, "new link displaces existing reactor");
            old.finish();
        }
        self.store.add_viewer(peer.clone());

        let handle = reactor::spawn(ReactorContext {
            peer: peer.clone(),
            generation,
            cooldown: self.cooldown,
            sender,
            receiver,
            commands: self.commands.clone(),
        });
        tracing::info!(peer = %peer, generation, "link attached");
        self.peers.insert(peer, handle);
    }

    fn detach(&mut self, peer: NodeId, generation: u64) {
        match self.peers.get(&peer) {
            Some(handle) if handle.generation == generation => {
                self.peers.remove(&peer);
                self.store.remove_viewer(&peer);
                tracing::info!(peer = %peer, "link detached");
            }
            _ => {
                // A newer reactor took this peer id; the stale detach is a
                // no-op.
                tracing::debug!(peer = %peer, generation, "stale detach ignored");
            }
        }
    }
}
