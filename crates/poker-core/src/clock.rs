use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

/// Shared wall clock with an adjustable offset.
///
/// Production code reads it as-is; tests shift the offset to fast-forward
/// duration-based logic (leader liveness) without sleeping.
#[derive(Clone, Debug, Default)]
pub struct Clock {
    offset: Arc<RwLock<Duration>>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current instant, shifted by the configured offset.
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now() + *self.offset.read()
    }

    /// Shift every subsequent `now()` by `offset`.
    pub fn set_offset(&self, offset: Duration) {
        *self.offset.write() = offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_close_to_utc_now() {
        let clock = Clock::new();
        let delta = clock.now() - Utc::now();
        assert!(delta.num_seconds().abs() < 2);
    }

    #[test]
    fn offset_shifts_now() {
        let clock = Clock::new();
        clock.set_offset(Duration::hours(5));
        let delta = clock.now() - Utc::now();
        assert!(delta >= Duration::minutes(299));
    }

    #[test]
    fn clones_share_the_offset() {
        let clock = Clock::new();
        let other = clock.clone();
        clock.set_offset(Duration::hours(1));
        let delta = other.now() - Utc::now();
        assert!(delta >= Duration::minutes(59));
    }
}
