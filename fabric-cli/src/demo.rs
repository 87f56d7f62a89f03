//! Demo components: a heartbeat reporter and a logging receiver.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use fabric_sync::{ComponentId, NodeId, Receiver, Reporter, SyncMessage, Syncer};

const BEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Produces a new heartbeat version at most once per second. In between,
/// the unchanged version is discarded by the store, so the wire stays quiet.
pub struct HeartbeatReporter {
    origin: NodeId,
    state: Mutex<BeatState>,
}

struct BeatState {
    version: u64,
    last_beat: Instant,
}

impl HeartbeatReporter {
    pub fn new(origin: NodeId) -> Self {
        Self {
            origin,
            state: Mutex::new(BeatState {
                version: 0,
                last_beat: Instant::now(),
            }),
        }
    }
}

impl Reporter for HeartbeatReporter {
    fn snapshot(&self) -> SyncMessage {
        let mut state = self.state.lock().unwrap();
        if state.version == 0 || state.last_beat.elapsed() >= BEAT_INTERVAL {
            state.version += 1;
            state.last_beat = Instant::now();
        }
        SyncMessage {
            origin: self.origin.clone(),
            component: ComponentId::RESOURCE_MANAGER,
            version: state.version,
            payload: format!("beat {} from {}", state.version, self.origin).into_bytes().into(),
        }
    }
}

/// Logs every snapshot it receives.
pub struct LogReceiver;

impl Receiver for LogReceiver {
    fn update(&mut self, message: &SyncMessage) {
        tracing::info!(
            origin = %message.origin,
            component = %message.component,
            version = message.version,
            bytes = message.payload.len(),
            "snapshot received"
        );
    }
}

/// Wire the demo components into a fabric.
pub fn register(syncer: &Syncer) {
    syncer.register(
        ComponentId::RESOURCE_MANAGER,
        Some(Box::new(HeartbeatReporter::new(syncer.node_id().clone()))),
        Some(Box::new(LogReceiver)),
    );
}
