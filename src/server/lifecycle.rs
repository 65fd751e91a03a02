//! Server lifecycle: Idle -> Running -> Draining -> Stopping -> Idle.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::Notify;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// No listener bound.
    Idle = 0,
    /// Listener open, accepting.
    Running = 1,
    /// New keep-alive sessions get `Connection: close`; listener stays open
    /// so health probes can observe the drain.
    Draining = 2,
    /// Listener closed; in-flight connections finish, then the loop exits.
    Stopping = 3,
}

impl LifecycleState {
    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Draining,
            3 => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

/// Shared lifecycle flags, written by control calls from any thread and
/// read by the accept loop and every connection worker.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
    drain_deadline: Mutex<Option<Instant>>,
    /// Wakes the accept loop out of its poll wait.
    pub(crate) wakeup: Notify,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Idle as u8),
            drain_deadline: Mutex::new(None),
            wakeup: Notify::new(),
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn is_draining(&self) -> bool {
        matches!(self.state(), LifecycleState::Draining | LifecycleState::Stopping)
    }

    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    pub(crate) fn set_state(&self, state: LifecycleState) {
        self.state.store(state as u8, Ordering::Release);
        self.wakeup.notify_waiters();
        self.wakeup.notify_one();
    }

    /// Enters draining; a later call only shrinks the existing deadline.
    pub(crate) fn begin_drain(&self, deadline: Option<Instant>) {
        let mut slot = self.drain_deadline.lock().unwrap_or_else(|e| e.into_inner());
        match (*slot, deadline) {
            (Some(current), Some(new)) => *slot = Some(current.min(new)),
            (None, Some(new)) => *slot = Some(new),
            _ => {}
        }
        drop(slot);

        if self.state() == LifecycleState::Running {
            self.set_state(LifecycleState::Draining);
        } else {
            self.wakeup.notify_one();
        }
    }

    #[inline]
    pub(crate) fn drain_deadline(&self) -> Option<Instant> {
        *self.drain_deadline.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn reset(&self) {
        *self.drain_deadline.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.state.store(LifecycleState::Idle as u8, Ordering::Release);
    }
}
