use chrono::{DateTime, Duration, Utc};
use poker_core::clock::Clock;

/// The moderator who opened the current chain, subject to a liveness timeout.
///
/// Liveness is a pure time predicate: nothing enforces it actively, callers
/// consult `is_dead()` where authority matters (close/reset by others).
#[derive(Clone, Debug)]
pub struct Leader {
    name: String,
    clock: Clock,
    last_touched: DateTime<Utc>,
    max_life: Duration,
}

impl Leader {
    pub fn new(name: impl Into<String>, clock: Clock, max_life: Duration) -> Self {
        let last_touched = clock.now();
        Self {
            name: name.into(),
            clock,
            last_touched,
            max_life,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// Record a heartbeat. Called on every successful leader action.
    pub fn alive(&mut self) {
        self.last_touched = self.clock.now();
    }

    /// The leader is dead once more than `max_life` has passed since the
    /// last heartbeat.
    pub fn is_dead(&self) -> bool {
        self.clock.now() - self.last_touched > self.max_life
    }
}
