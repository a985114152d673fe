//! Owning slot for promises nobody else keeps
//!
//! A promise must have an owner until it concludes. For fire-and-forget chains
//! a [`PromiseHolder`] can act as that owner: it keeps each held promise alive
//! until it concludes and then lets go of it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::cancellation::Cancellable;
use crate::context::MainContext;
use crate::promise::{Promise, PromiseId};

type Held = Rc<RefCell<HashMap<PromiseId, Rc<dyn Cancellable>>>>;

/// Keeps promises alive until they conclude
///
/// Dropping a holder releases every promise it still holds, which is a
/// contract violation for any of them that is still pending and owned by
/// nobody else. Call [`cancel_all`](Self::cancel_all) first when tearing down.
#[derive(Default)]
pub struct PromiseHolder {
    held: Held,
}

impl PromiseHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `promise` alive until it concludes.
    ///
    /// A promise that already concluded is not held.
    pub fn hold<T: Clone + 'static>(&self, cx: &MainContext, promise: &Promise<T>) {
        if !promise.is_pending() {
            return;
        }

        let id = promise.id();
        self.held.borrow_mut().insert(id, promise.as_cancellable());

        let held = Rc::downgrade(&self.held);
        let _ = promise.on_outcome(cx, move |outcome| {
            if let Some(held) = held.upgrade() {
                held.borrow_mut().remove(&id);
                tracing::trace!("Released {} ({})", id, outcome.kind());
            }
        });
    }

    /// Number of promises still held
    pub fn len(&self) -> usize {
        self.held.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.borrow().is_empty()
    }

    /// Cancel every held promise. Each one is released as it concludes.
    pub fn cancel_all(&self, cx: &MainContext) {
        let held: Vec<_> = self.held.borrow().values().cloned().collect();
        tracing::debug!("Cancelling {} held promises", held.len());
        for promise in held {
            promise.cancel(cx);
        }
    }
}

impl std::fmt::Debug for PromiseHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromiseHolder")
            .field("held", &self.len())
            .finish()
    }
}
