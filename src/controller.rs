//! Restartable single-flight promise slot

use crate::context::MainContext;
use crate::promise::Promise;

/// Owns at most one in-flight promise produced by a factory
///
/// [`run`](Self::run) cancels whatever is in flight and starts over, which is
/// the usual shape for "refresh" style operations where only the latest
/// request matters.
///
/// Only the promise the factory returned is cancelled, along with its
/// descendants. Promises it was chained from keep running, since other
/// consumers may share them. A controller whose factory builds a private
/// chain can opt into [`with_cancel_to_origin`](Self::with_cancel_to_origin)
/// to stop the whole chain.
pub struct PromiseController<T> {
    factory: Box<dyn FnMut(&MainContext) -> Promise<T>>,
    current: Option<Promise<T>>,
    to_origin: bool,
}

impl<T: Clone + 'static> PromiseController<T> {
    pub fn new<F>(factory: F) -> Self
    where
        F: FnMut(&MainContext) -> Promise<T> + 'static,
    {
        Self {
            factory: Box::new(factory),
            current: None,
            to_origin: false,
        }
    }

    /// Cancel up the superpromise chain as well.
    ///
    /// Only safe when every stage of the chain belongs to this controller.
    pub fn with_cancel_to_origin(mut self) -> Self {
        self.to_origin = true;
        self
    }

    /// Cancel the current promise, if any, and start a fresh one.
    pub fn run(&mut self, cx: &MainContext) -> Promise<T> {
        self.cancel(cx);
        let promise = (self.factory)(cx);
        tracing::debug!("Controller started {}", promise.id());
        self.current = Some(promise.clone());
        promise
    }

    /// Cancel and release the current promise.
    pub fn cancel(&mut self, cx: &MainContext) {
        if let Some(promise) = self.current.take() {
            if promise.is_pending() {
                tracing::debug!("Controller cancelling {}", promise.id());
            }
            if self.to_origin {
                promise.cancel_to_origin(cx);
            } else {
                promise.cancel(cx);
            }
        }
    }

    /// The most recently started promise, until it is cancelled
    pub fn current(&self) -> Option<&Promise<T>> {
        self.current.as_ref()
    }
}

impl<T> std::fmt::Debug for PromiseController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromiseController")
            .field("current", &self.current)
            .field("to_origin", &self.to_origin)
            .finish()
    }
}
