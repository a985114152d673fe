//! Delayed jobs for the main context
//!
//! The [`TimerQueue`] backs `MainContext::post_after`. It is owned by a single
//! context and is never shared across threads.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

pub mod id;

pub use id::TimerId;

/// An entry in the queue, associating a TimerId with its payload
struct Entry<J> {
    id: TimerId,
    job: J,
}

/// Deadline-ordered queue of delayed jobs
///
/// Jobs are keyed by `(deadline, id)`. Because ids grow monotonically, jobs that
/// share a deadline expire in scheduling order.
pub struct TimerQueue<J> {
    entries: BTreeMap<(Instant, TimerId), Entry<J>>,
    deadlines: HashMap<TimerId, Instant>,
}

impl<J> Default for TimerQueue<J> {
    fn default() -> Self {
        Self::new()
    }
}

impl<J> TimerQueue<J> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    /// Schedules a job to expire at the specified time
    ///
    /// Returns a TimerId that can be used to cancel the job
    pub fn schedule(&mut self, at: Instant, job: J) -> TimerId {
        let id = TimerId::new();
        self.entries.insert((at, id), Entry { id, job });
        self.deadlines.insert(id, at);
        id
    }

    /// Attempts to cancel the job with the given ID
    ///
    /// Returns the job if it was still scheduled
    pub fn cancel(&mut self, id: TimerId) -> Option<J> {
        let at = self.deadlines.remove(&id)?;
        self.entries.remove(&(at, id)).map(|entry| entry.job)
    }

    /// Moves every job whose deadline is at or before `now` into `ready`,
    /// earliest first.
    pub fn expire(&mut self, now: Instant, ready: &mut Vec<J>) {
        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let Entry { id, job } = entry.remove();
            self.deadlines.remove(&id);
            ready.push(job);
        }
    }

    /// The earliest deadline still scheduled.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(at, _)| *at)
    }

    /// Returns the number of pending jobs
    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
