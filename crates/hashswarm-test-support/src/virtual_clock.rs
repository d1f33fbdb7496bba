//! A shared, manually-advanced clock used to drive `QueryForwardingMachine`
//! in tests without real sleeps. `VirtualClock` implements both `Clock` and
//! `Timer`; a clone shares the same underlying state, so a test can hold one
//! handle to call `advance` while a machine owns another.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hashswarm_forwarding::{Clock, Timer, TimerHandle};

struct Inner {
    base: Instant,
    elapsed: Duration,
    next_handle: u64,
}

#[derive(Clone)]
pub struct VirtualClock {
    inner: Arc<Mutex<Inner>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                base: Instant::now(),
                elapsed: Duration::ZERO,
                next_handle: 0,
            })),
        }
    }

    /// Move the clock forward by `by`, observable from every clone.
    pub fn advance(&self, by: Duration) {
        self.inner.lock().unwrap().elapsed += by;
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        let inner = self.inner.lock().unwrap();
        inner.base + inner.elapsed
    }
}

impl Timer for VirtualClock {
    /// Virtual schedules never fire on their own; tests drive timeouts by
    /// calling `QueryForwardingMachine::on_timer_fired` directly after
    /// advancing the clock, so this only needs to mint distinct handles.
    fn schedule(&mut self, _after: Duration, _token: String) -> TimerHandle {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_handle;
        inner.next_handle += 1;
        TimerHandle(id)
    }

    fn cancel(&mut self, _handle: TimerHandle) {}
}
