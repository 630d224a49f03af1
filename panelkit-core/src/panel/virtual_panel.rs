//! In-memory panel used by the simulator and by tests.
//!
//! Records the last value driven on every output join and builds inbound
//! [`SignalEvent`]s the host feeds into the router.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use ahash::RandomState;
use compact_str::CompactString;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::panel::device::{Panel, PanelId, PanelRef};
use crate::panel::signal::{SignalEvent, SignalValue};
use crate::registry::signal_kind::{JoinEnum, SignalKind};

#[derive(Debug)]
pub struct VirtualPanel {
    id: PanelId,
    name: CompactString,
    online: AtomicBool,
    device_registrations: AtomicU32,
    feedback: Mutex<HashMap<(u32, SignalKind), SignalValue, RandomState>>,
}

impl VirtualPanel {
    #[must_use]
    pub fn new(id: PanelId, name: impl Into<CompactString>) -> Self {
        Self {
            id,
            name: name.into(),
            online: AtomicBool::new(true),
            device_registrations: AtomicU32::new(0),
            feedback: Mutex::new(HashMap::with_hasher(RandomState::new())),
        }
    }

    /// Shared handle, ready for [`PanelLogicPool::register_panel`].
    ///
    /// [`PanelLogicPool::register_panel`]: crate::panel::logic_pool::PanelLogicPool::register_panel
    #[must_use]
    pub fn shared(id: PanelId, name: impl Into<CompactString>) -> Arc<Self> {
        Arc::new(Self::new(id, name))
    }

    #[must_use]
    pub fn as_panel_ref(self: &Arc<Self>) -> PanelRef {
        self.clone()
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }

    /// Number of times the control system registration hook ran.
    #[must_use]
    pub fn device_registrations(&self) -> u32 {
        self.device_registrations.load(Ordering::Relaxed)
    }

    /// Last value driven on an output join.
    #[must_use]
    pub fn feedback(&self, join: u32, kind: SignalKind) -> Option<SignalValue> {
        self.feedback.lock().get(&(join, kind)).cloned()
    }

    #[must_use]
    pub fn digital_feedback(&self, join: u32) -> bool {
        matches!(
            self.feedback(join, SignalKind::Digital),
            Some(SignalValue::Digital(true))
        )
    }

    #[must_use]
    pub fn analog_feedback(&self, join: u32) -> u16 {
        match self.feedback(join, SignalKind::Analog) {
            Some(SignalValue::Analog(v)) => v,
            _ => 0,
        }
    }

    #[must_use]
    pub fn serial_feedback(&self, join: u32) -> CompactString {
        match self.feedback(join, SignalKind::Serial) {
            Some(SignalValue::Serial(v)) => v,
            _ => CompactString::default(),
        }
    }

    /// Snapshot of every driven join, sorted by kind then join.
    #[must_use]
    pub fn feedback_snapshot(&self) -> Vec<(SignalKind, u32, SignalValue)> {
        let mut snapshot: Vec<(SignalKind, u32, SignalValue)> = self
            .feedback
            .lock()
            .iter()
            .map(|((join, kind), value)| (*kind, *join, value.clone()))
            .collect();
        snapshot.sort_by_key(|(kind, join, _)| (*kind, *join));
        snapshot
    }

    pub fn press<J: JoinEnum>(&self, join: J) -> SignalEvent {
        SignalEvent::digital(join.join_number(), true)
    }

    pub fn release<J: JoinEnum>(&self, join: J) -> SignalEvent {
        SignalEvent::digital(join.join_number(), false)
    }

    pub fn analog<J: JoinEnum>(&self, join: J, value: u16) -> SignalEvent {
        SignalEvent::analog(join.join_number(), value)
    }

    pub fn serial<J: JoinEnum>(&self, join: J, value: &str) -> SignalEvent {
        SignalEvent::serial(join.join_number(), value)
    }

    fn drive(&self, join: u32, value: SignalValue) {
        trace!(panel = self.id, join, %value, "Driving feedback");
        self.feedback.lock().insert((join, value.kind()), value);
    }
}

impl Panel for VirtualPanel {
    fn id(&self) -> PanelId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    fn set_digital(&self, join: u32, value: bool) {
        self.drive(join, SignalValue::Digital(value));
    }

    fn set_analog(&self, join: u32, value: u16) {
        self.drive(join, SignalValue::Analog(value));
    }

    fn set_serial(&self, join: u32, value: &str) {
        self.drive(join, SignalValue::Serial(CompactString::new(value)));
    }

    fn register_device(&self) -> anyhow::Result<()> {
        self.device_registrations.fetch_add(1, Ordering::Relaxed);
        debug!(panel = self.id, name = %self.name, "Virtual panel registered with control system");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_is_recorded_per_kind() {
        let panel = VirtualPanel::new(0x03, "Lobby");

        panel.set_digital(1, true);
        panel.set_analog(1, 300);
        panel.set_serial(1, "Welcome");

        assert!(panel.digital_feedback(1));
        assert_eq!(panel.analog_feedback(1), 300);
        assert_eq!(panel.serial_feedback(1), "Welcome");
        assert_eq!(panel.feedback_snapshot().len(), 3);
        assert!(panel.feedback(2, SignalKind::Digital).is_none());
    }

    #[test]
    fn test_online_flag() {
        let panel = VirtualPanel::new(0x04, "Office");
        assert!(panel.is_online());

        panel.set_online(false);
        assert!(!panel.is_online());
    }
}
