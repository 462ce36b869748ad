//! Wall-clock seam.
//!
//! Every module tick takes a [`Clock`] so decisions are deterministic under
//! test: production uses [`SystemClock`], tests use a virtual clock that
//! advances on `sleep`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of "now" and of blocking delays.
pub trait Clock {
    /// Seconds since the Unix epoch.
    fn now_epoch(&self) -> i64;

    /// Block for `dur`. Settle delays and probe spacing go through here.
    fn sleep(&self, dur: Duration);
}

/// Real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    fn sleep(&self, dur: Duration) {
        std::thread::sleep(dur);
    }
}
