use std::time::Duration;

use steward_core::DeviceId;
use tokio::time::Instant;

/// Per-device coalescing timer.
///
/// Owned exclusively by that device's worker task. Every observed
/// change pushes the deadline out to `now + interval`; the burst is
/// settled once the deadline elapses with no further changes.
#[derive(Debug)]
pub struct DebounceWindow {
    device: DeviceId,
    deadline: Option<Instant>,
}

impl DebounceWindow {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            deadline: None,
        }
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Note a change: open the window or push its deadline out.
    pub fn extend(&mut self, interval: Duration) {
        self.deadline = Some(Instant::now() + interval);
    }

    /// Close the window. Returns whether a burst was actually pending.
    pub fn settle(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}
