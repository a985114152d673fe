use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A unique identifier for a scheduled delayed job
///
/// Ids are handed out in increasing order, so two jobs with the same deadline
/// fire in the order they were scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

static TIMER_COUNTER: AtomicU64 = AtomicU64::new(1);

impl Default for TimerId {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerId {
    /// Generates a new unique TimerId
    pub fn new() -> Self {
        TimerId(TIMER_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}
