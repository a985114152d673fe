//! Single-context runtime loop
//!
//! The [`Runtime`] owns a [`MainContext`] and drives it: queued jobs run in
//! FIFO order, completions arriving from background threads re-enter the
//! context, and delayed jobs fire once their deadline passes.
//!
//! The loop never waits on a particular promise. [`Runtime::run`] returns once
//! there is nothing left that could make progress: no queued job, no pending
//! timer and no completion still in flight.

use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::config::{default_background_threads, DEFAULT_RUNTIME_NAME, IDLE_PARK_TIMEOUT_MS};
use crate::context::MainContext;
use crate::error::Result;
use crate::observer::PromiseObserver;

/// A single-threaded promise runtime
pub struct Runtime {
    context: MainContext,
    idle_park: Duration,
}

impl Runtime {
    /// Create a runtime with default settings
    pub fn new() -> Result<Self> {
        RuntimeBuilder::new().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// The context token passed to every promise operation
    pub fn context(&self) -> &MainContext {
        &self.context
    }

    /// Run everything that is ready right now
    ///
    /// Returns whether any job, completion or timer ran.
    pub fn tick(&self) -> bool {
        let mut made_progress = self.context.run_jobs();
        made_progress |= self.context.drain_inbox();
        made_progress |= self.context.fire_timers(Instant::now());
        // Completions and timers usually queue follow-up work.
        made_progress |= self.context.run_jobs();
        made_progress
    }

    /// Whether nothing is queued, scheduled or in flight
    pub fn is_idle(&self) -> bool {
        !self.context.has_queued_jobs()
            && self.context.pending_timers() == 0
            && self.context.in_flight() == 0
    }

    /// Run until idle
    pub fn run(&self) {
        loop {
            self.tick();
            if self.is_idle() {
                break;
            }
            if self.context.has_queued_jobs() {
                continue;
            }

            let mut park = self.idle_park;
            if let Some(deadline) = self.context.next_deadline() {
                park = park.min(deadline.saturating_duration_since(Instant::now()));
            }
            if !park.is_zero() {
                // Wakes early when a completion arrives.
                self.context.wait_inbox(park);
            }
        }
        tracing::debug!("Runtime {} is idle", self.context.name());
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if !self.is_idle() && !std::thread::panicking() {
            tracing::warn!(
                "Runtime {} dropped with {} timers and {} completions outstanding",
                self.context.name(),
                self.context.pending_timers(),
                self.context.in_flight()
            );
        }
    }
}

/// A runtime builder for customizing runtime properties
pub struct RuntimeBuilder {
    name: Option<String>,
    background_threads: Option<usize>,
    observer: Option<Rc<dyn PromiseObserver>>,
    idle_park: Duration,
}

impl RuntimeBuilder {
    /// Create a new runtime builder
    pub fn new() -> Self {
        Self {
            name: None,
            background_threads: None,
            observer: None,
            idle_park: Duration::from_millis(IDLE_PARK_TIMEOUT_MS),
        }
    }

    /// Set the runtime name used in logs and worker thread names
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the number of background workers
    pub fn background_threads(mut self, threads: usize) -> Self {
        self.background_threads = Some(threads);
        self
    }

    /// Observe the lifecycle of every promise created on this runtime
    pub fn observer(mut self, observer: Rc<dyn PromiseObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Cap how long an idle loop parks before re-checking its queues
    pub fn idle_park(mut self, park: Duration) -> Self {
        self.idle_park = park;
        self
    }

    pub fn build(self) -> Result<Runtime> {
        let name = self.name.unwrap_or_else(|| DEFAULT_RUNTIME_NAME.to_string());
        let threads = self
            .background_threads
            .unwrap_or_else(default_background_threads);
        let context = MainContext::new(name, threads, self.observer)?;
        Ok(Runtime {
            context,
            idle_park: self.idle_park,
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn test_runtime_creation() {
        let runtime = Runtime::builder().name("unit").background_threads(2).build().unwrap();
        assert_eq!(runtime.context().name(), "unit");
        assert_eq!(runtime.context().background_threads(), 2);
        assert!(runtime.is_idle());
    }

    #[test]
    fn test_tick_without_work() {
        let runtime = Runtime::builder().background_threads(1).build().unwrap();
        assert!(!runtime.tick());
    }

    #[test]
    fn test_run_drains_posted_jobs() {
        let runtime = Runtime::builder().background_threads(1).build().unwrap();
        let counter = Rc::new(Cell::new(0));

        for _ in 0..5 {
            let counter = counter.clone();
            runtime.context().post(move |_| counter.set(counter.get() + 1));
        }
        assert!(!runtime.is_idle());

        runtime.run();
        assert_eq!(counter.get(), 5);
        assert!(runtime.is_idle());
    }

    #[test]
    fn test_run_waits_for_timers() {
        let runtime = Runtime::builder().background_threads(1).build().unwrap();
        let fired_at = Rc::new(Cell::new(None));
        let started = Instant::now();

        let fired_clone = fired_at.clone();
        runtime
            .context()
            .post_after(Duration::from_millis(20), move |_| fired_clone.set(Some(Instant::now())));
        runtime.run();

        let fired = fired_at.get().expect("timer should have fired");
        assert!(fired.duration_since(started) >= Duration::from_millis(20));
    }

    #[test]
    fn test_run_waits_for_background_work() {
        let runtime = Runtime::builder().background_threads(2).build().unwrap();
        let results = Rc::new(RefCell::new(Vec::new()));

        for i in 0..4u32 {
            let results = results.clone();
            runtime.context().spawn_background(
                move || {
                    std::thread::sleep(Duration::from_millis(5));
                    i * 10
                },
                move |_, value| results.borrow_mut().push(value.unwrap()),
            );
        }
        runtime.run();

        let mut values = results.borrow().clone();
        values.sort_unstable();
        assert_eq!(values, vec![0, 10, 20, 30]);
    }

    #[test]
    fn test_timers_fire_in_deadline_order() {
        let runtime = Runtime::builder().background_threads(1).build().unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        for (delay, tag) in [(15u64, "late"), (1, "early"), (8, "middle")] {
            let log = log.clone();
            runtime
                .context()
                .post_after(Duration::from_millis(delay), move |_| log.borrow_mut().push(tag));
        }
        runtime.run();

        assert_eq!(*log.borrow(), vec!["early", "middle", "late"]);
    }
}
