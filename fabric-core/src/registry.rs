//! Local component registry.
//!
//! Each node hosts at most one reporter and one receiver per component.
//! Slots are bound once at startup and never rebound.

use fabric_types::{ComponentId, SyncMessage};

/// Local source of snapshots for one component.
///
/// Called on the fabric's driver task every write tick, so implementations
/// should be fast; heavy producers can snapshot into interior state from
/// elsewhere and hand out the latest value here.
pub trait Reporter: Send {
    /// Produce the current snapshot. Versions must be monotonically
    /// non-decreasing; an unchanged version is discarded by the store.
    fn snapshot(&self) -> SyncMessage;
}

/// Local consumer of remote snapshots for one component.
pub trait Receiver: Send {
    /// Handle a snapshot received from the network.
    fn update(&mut self, message: &SyncMessage);
}

/// Fixed-size reporter/receiver slot arrays, indexed by component id.
#[derive(Default)]
pub struct LocalRegistry {
    reporters: [Option<Box<dyn Reporter>>; ComponentId::COUNT],
    receivers: [Option<Box<dyn Receiver>>; ComponentId::COUNT],
    bound: [bool; ComponentId::COUNT],
}

impl LocalRegistry {
    /// Create a registry with every slot empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a slot. Reporter may be `None` (consume-only); receiver may be
    /// `None` (produce-only).
    ///
    /// # Panics
    ///
    /// Panics if the component is outside the known set or the slot already
    /// holds a reporter or receiver — both are programming errors.
    pub fn register(
        &mut self,
        component: ComponentId,
        reporter: Option<Box<dyn Reporter>>,
        receiver: Option<Box<dyn Receiver>>,
    ) {
        let slot = component
            .slot()
            .unwrap_or_else(|| panic!("register: unknown component {component}"));
        assert!(
            !self.bound[slot],
            "register: component {component} already bound"
        );
        self.bound[slot] = true;
        self.reporters[slot] = reporter;
        self.receivers[slot] = receiver;
    }

    /// Whether any slot holds a reporter.
    pub fn has_reporters(&self) -> bool {
        self.reporters.iter().any(Option::is_some)
    }

    /// Collect a fresh snapshot from every bound reporter.
    pub fn snapshots(&self) -> Vec<SyncMessage> {
        self.reporters
            .iter()
            .flatten()
            .map(|reporter| reporter.snapshot())
            .collect()
    }

    /// Hand a remote message to the matching receiver, if any.
    ///
    /// Messages for unknown or receiver-less components are dropped
    /// silently. Returns whether a receiver was invoked.
    pub fn deliver(&mut self, message: &SyncMessage) -> bool {
        let Some(slot) = message.component.slot() else {
            tracing::trace!(component = %message.component, "no slot for component, dropped");
            return false;
        };
        match &mut self.receivers[slot] {
            Some(receiver) => {
                receiver.update(message);
                true
            }
            None => false,
        }
    }
}
