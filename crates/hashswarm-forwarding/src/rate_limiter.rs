use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding-window rate limiter: at most `max_events` allowed within any
/// `window` span, per owning key. One instance tracks exactly one requester.
pub struct RateLimiter {
    max_events: u32,
    window: Duration,
    events: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(max_events: u32, window: Duration) -> Self {
        Self {
            max_events,
            window,
            events: VecDeque::new(),
        }
    }

    /// Purges events older than the window, then admits `now` if under quota.
    pub fn allow(&mut self, now: Instant) -> bool {
        while let Some(&oldest) = self.events.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.events.pop_front();
            } else {
                break;
            }
        }
        if self.events.len() >= self.max_events as usize {
            return false;
        }
        self.events.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_events_in_window() {
        let mut rl = RateLimiter::new(2, Duration::from_millis(1000));
        let t0 = Instant::now();
        assert!(rl.allow(t0));
        assert!(rl.allow(t0));
        assert!(!rl.allow(t0));
    }

    #[test]
    fn window_expiry_frees_quota() {
        let mut rl = RateLimiter::new(1, Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(rl.allow(t0));
        assert!(!rl.allow(t0 + Duration::from_millis(50)));
        assert!(rl.allow(t0 + Duration::from_millis(101)));
    }
}
