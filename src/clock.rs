use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, Utc};

/// Injectable time source. Every component that compares against "now"
/// (token expiry, refresh-token state, purge) goes through this trait so
/// tests can pin the clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    fn now_unix(&self) -> usize {
        self.now().timestamp().max(0) as usize
    }
}

/// Wall clock used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().fixed_offset()
    }
}

/// Test clock frozen at a chosen instant; can be advanced explicitly.
pub struct FixedClock {
    at: Mutex<DateTime<FixedOffset>>,
}

impl FixedClock {
    pub fn at(at: DateTime<FixedOffset>) -> Self {
        Self { at: Mutex::new(at) }
    }

    pub fn advance(&self, by: Duration) {
        let mut at = self.at.lock().expect("clock lock poisoned");
        *at = *at + by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.at.lock().expect("clock lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, FixedOffset, TimeZone};

    use super::{Clock, FixedClock};

    #[test]
    fn fixed_clock_holds_and_advances() {
        let start = FixedOffset::east_opt(0)
            .expect("offset should be valid")
            .with_ymd_and_hms(2026, 1, 1, 12, 0, 0)
            .single()
            .expect("timestamp should be valid");
        let clock = FixedClock::at(start);

        assert_eq!(clock.now(), start);
        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), start + Duration::minutes(90));
        assert_eq!(clock.now_unix(), (start + Duration::minutes(90)).timestamp() as usize);
    }
}
