use std::time::{Duration, Instant};

/// A monotonic clock the forwarding machine reads to evaluate rate-limiter
/// windows. Implemented by a real `Instant`-backed clock in production and
/// by `hashswarm_test_support::VirtualClock` in tests.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// An opaque handle to a scheduled timeout. Only ever created by `Timer::schedule`
/// and consumed by `Timer::cancel`; the forwarding machine never inspects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle(pub u64);

/// Schedules a deferred callback token. The forwarding machine schedules one
/// timer per in-flight hash and cancels it on resolve/cancel; a timer that
/// fires without being cancelled first should route back into
/// `QueryForwardingMachine::on_timer_fired` with the scheduled token.
pub trait Timer {
    fn schedule(&mut self, after: Duration, token: String) -> TimerHandle;
    fn cancel(&mut self, handle: TimerHandle);
}

/// Real-clock implementation, driven by `tokio::time` at the call site
/// (the `Timer` trait itself is runtime-agnostic; see `hashswarm-peer`'s
/// controller for how scheduled tokens are turned into `tokio::time::sleep`
/// futures raced in a `select!` loop).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Real-timer implementation. Each `schedule` spawns a `tokio::time::sleep`
/// task that reports the token on `fired` once it elapses; `cancel` aborts
/// the task outright. The owning loop is expected to drain `fired` and call
/// `QueryForwardingMachine::on_timer_fired` for each token it receives.
pub struct TokioTimer {
    fired: tokio::sync::mpsc::UnboundedSender<String>,
    handles: std::collections::HashMap<u64, tokio::task::AbortHandle>,
    next_handle: u64,
}

impl TokioTimer {
    /// Returns the timer along with the receiving half of its fired-token
    /// channel; the caller drives a loop over that receiver.
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (
            Self {
                fired: tx,
                handles: std::collections::HashMap::new(),
                next_handle: 0,
            },
            rx,
        )
    }
}

impl Timer for TokioTimer {
    fn schedule(&mut self, after: Duration, token: String) -> TimerHandle {
        let id = self.next_handle;
        self.next_handle += 1;
        let fired = self.fired.clone();
        let join = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = fired.send(token);
        });
        self.handles.insert(id, join.abort_handle());
        TimerHandle(id)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(abort) = self.handles.remove(&handle.0) {
            abort.abort();
        }
    }
}
