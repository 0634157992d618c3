//! Data-loss watchdog for the live feed.

use std::time::{Duration, Instant};

/// Silence after which the feed is considered lost.
pub const DATA_TIMEOUT: Duration = Duration::from_secs(1);

/// Tracks the time of the last received frame and flags data loss.
#[derive(Clone, Debug)]
pub struct LinkWatchdog {
    timeout: Duration,
    last_feed: Instant,
    lost: bool,
}

impl LinkWatchdog {
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            timeout,
            last_feed: now,
            lost: false,
        }
    }

    /// Record a valid frame. Returns `true` if this clears a data-loss
    /// condition. An older stamp never moves the last feed backwards.
    pub fn feed(&mut self, now: Instant) -> bool {
        self.last_feed = self.last_feed.max(now);
        std::mem::replace(&mut self.lost, false)
    }

    /// Returns `true` exactly once per outage, when the silence first
    /// exceeds the timeout.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.lost || now.saturating_duration_since(self.last_feed) <= self.timeout {
            return false;
        }
        self.lost = true;
        true
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_feed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_once_per_outage() {
        let t0 = Instant::now();
        let mut wd = LinkWatchdog::new(DATA_TIMEOUT, t0);
        assert!(!wd.poll(t0 + Duration::from_millis(1000)));
        assert!(wd.poll(t0 + Duration::from_millis(1001)));
        assert!(wd.is_lost());
        assert!(!wd.poll(t0 + Duration::from_secs(5)));

        assert!(wd.feed(t0 + Duration::from_secs(6)));
        assert!(!wd.is_lost());
        assert!(!wd.feed(t0 + Duration::from_secs(6)));
        assert!(wd.poll(t0 + Duration::from_millis(7500)));
    }

    #[test]
    fn late_feed_does_not_rewind() {
        let t0 = Instant::now();
        let mut wd = LinkWatchdog::new(DATA_TIMEOUT, t0);
        wd.feed(t0 + Duration::from_millis(900));
        wd.feed(t0 + Duration::from_millis(100));
        assert!(!wd.poll(t0 + Duration::from_millis(1800)));
        assert!(wd.poll(t0 + Duration::from_millis(1901)));
    }
}
