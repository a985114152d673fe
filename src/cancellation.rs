//! Cancellation utilities
//!
//! [`Cancellable`] is the view of a promise node that survives type erasure: a
//! child keeps a `Weak<dyn Cancellable>` to whatever node currently governs
//! it, whatever that node's value type is.
//!
//! [`CancellationToken`] lets work running off the main context notice that
//! its promise was cancelled. Cancellation never interrupts that work; the
//! work has to check the token and exit early on its own.

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::context::MainContext;
use crate::promise::PromiseId;

/// A cancel-capable promise node of any value type
pub trait Cancellable {
    fn id(&self) -> PromiseId;

    fn is_pending(&self) -> bool;

    /// Conclude as cancelled unless already concluded.
    fn cancel(&self, cx: &MainContext);

    /// The node currently governing this one, if it is still alive.
    fn superpromise(&self) -> Option<Rc<dyn Cancellable>>;

    /// Withdraw the continuation queued on behalf of the cancelled `child`.
    fn detach(&self, child: PromiseId);
}

/// A token that can be used to signal cancellation to background work
#[derive(Clone, Debug)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new cancellation token
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel the token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
