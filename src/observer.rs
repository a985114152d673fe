//! Promise lifecycle observation
//!
//! Observers are registered per runtime (see `RuntimeBuilder::observer`) and
//! are told about every promise the context creates, concludes and destroys.

use std::cell::Cell;

use crate::outcome::OutcomeKind;
use crate::promise::PromiseId;

/// Hooks invoked on the main context as promises move through their lifecycle.
pub trait PromiseObserver {
    fn created(&self, _id: PromiseId) {}

    fn concluded(&self, _id: PromiseId, _kind: OutcomeKind) {}

    fn destroyed(&self, _id: PromiseId) {}
}

/// Counts promise instances.
///
/// Useful in tests to assert that a finished chain left nothing alive.
#[derive(Debug, Default)]
pub struct InstanceCounter {
    created: Cell<usize>,
    destroyed: Cell<usize>,
    ready: Cell<usize>,
    failed: Cell<usize>,
    cancelled: Cell<usize>,
}

impl InstanceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Promises created and not yet destroyed.
    pub fn live(&self) -> usize {
        self.created.get() - self.destroyed.get()
    }

    pub fn created_count(&self) -> usize {
        self.created.get()
    }

    pub fn concluded_count(&self, kind: OutcomeKind) -> usize {
        match kind {
            OutcomeKind::Ready => self.ready.get(),
            OutcomeKind::Failed => self.failed.get(),
            OutcomeKind::Cancelled => self.cancelled.get(),
        }
    }
}

impl PromiseObserver for InstanceCounter {
    fn created(&self, _id: PromiseId) {
        self.created.set(self.created.get() + 1);
    }

    fn concluded(&self, _id: PromiseId, kind: OutcomeKind) {
        let counter = match kind {
            OutcomeKind::Ready => &self.ready,
            OutcomeKind::Failed => &self.failed,
            OutcomeKind::Cancelled => &self.cancelled,
        };
        counter.set(counter.get() + 1);
    }

    fn destroyed(&self, _id: PromiseId) {
        self.destroyed.set(self.destroyed.get() + 1);
    }
}
