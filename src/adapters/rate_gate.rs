//! Minimum-interval request limiter shared by every run using one provider.
//!
//! Callers reserve the next free slot under a mutex and sleep outside it,
//! so concurrent runs queue up one interval apart instead of bursting.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Debug)]
pub struct RateGate {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        RateGate {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// `requests` per minute; zero disables the limit.
    pub fn per_minute(requests: u32) -> Self {
        if requests == 0 {
            return RateGate::new(Duration::ZERO);
        }
        RateGate::new(Duration::from_secs(60) / requests)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until the caller may issue its request.
    pub fn acquire(&self) {
        let wait = self.reserve(Instant::now());
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "rate gate waiting");
            thread::sleep(wait);
        }
    }

    /// Claim the earliest slot at or after `now` and return how long to wait for it.
    fn reserve(&self, now: Instant) -> Duration {
        let mut next = self
            .next_slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let slot = match *next {
            Some(t) if t > now => t,
            _ => now,
        };
        *next = Some(slot + self.min_interval);
        slot - now
    }
}
