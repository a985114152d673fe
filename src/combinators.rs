//! Convenience combinators
//!
//! Every combinator here is a thin layer over [`Promise::then`]: it builds the
//! intermediate promise for one concrete pattern (mapping, terminal callbacks,
//! delays, background hops, chained cancellation) and leaves ownership and
//! cancellation semantics to the core protocol.

use std::rc::Rc;
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::context::MainContext;
use crate::error::{BackgroundPanic, DomainError};
use crate::outcome::Outcome;
use crate::promise::Promise;

/// Convert a background result into an outcome, reporting panics as failures.
fn settle<T>(result: std::thread::Result<Outcome<T>>) -> Outcome<T> {
    match result {
        Ok(outcome) => outcome,
        Err(payload) => {
            let panic = BackgroundPanic::from_payload(payload);
            tracing::warn!("{}", panic);
            Outcome::Failed(panic.into())
        }
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// Transform a ready value. Failures and cancellation pass through.
    pub fn map<U, F>(&self, cx: &MainContext, f: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.then(cx, move |cx, outcome| Promise::concluded(cx, outcome.map(f)))
    }

    /// Transform a ready value with a fallible function; its error becomes
    /// [`Outcome::Failed`].
    pub fn try_map<U, E, F>(&self, cx: &MainContext, f: F) -> Promise<U>
    where
        U: Clone + 'static,
        E: Into<DomainError>,
        F: FnOnce(T) -> Result<U, E> + 'static,
    {
        self.then(cx, move |cx, outcome| Promise::concluded(cx, outcome.try_map(f)))
    }

    /// Chain a promise-producing step on a ready value. Failures and
    /// cancellation pass through without calling `f`.
    pub fn and_then<U, F>(&self, cx: &MainContext, f: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(&MainContext, T) -> Promise<U> + 'static,
    {
        self.then(cx, move |cx, outcome| match outcome {
            Outcome::Ready(value) => f(cx, value),
            Outcome::Failed(error) => Promise::failed(cx, error),
            Outcome::Cancelled => Promise::cancelled(cx),
        })
    }

    /// Observe the outcome and end the chain.
    ///
    /// The returned promise concludes with the same kind of outcome, carrying
    /// no value.
    pub fn on_outcome<F>(&self, cx: &MainContext, f: F) -> Promise<()>
    where
        F: FnOnce(&Outcome<T>) + 'static,
    {
        self.then(cx, move |cx, outcome| {
            f(&outcome);
            Promise::concluded(cx, outcome.map(|_| ()))
        })
    }

    /// Run `f` with the value if this promise becomes ready.
    pub fn on_ready<F>(&self, cx: &MainContext, f: F) -> Promise<()>
    where
        F: FnOnce(T) + 'static,
    {
        self.then(cx, move |cx, outcome| Promise::concluded(cx, outcome.map(f)))
    }

    /// Run `f` with the error if this promise fails.
    pub fn on_error<F>(&self, cx: &MainContext, f: F) -> Promise<()>
    where
        F: FnOnce(DomainError) + 'static,
    {
        self.then(cx, move |cx, outcome| {
            if let Outcome::Failed(error) = &outcome {
                f(error.clone());
            }
            Promise::concluded(cx, outcome.map(|_| ()))
        })
    }

    /// Forward this promise's outcome after waiting `delay`.
    ///
    /// A cancelled outcome is forwarded at once. Cancelling the returned
    /// promise while it waits drops the delayed outcome.
    pub fn then_wait(&self, cx: &MainContext, delay: Duration) -> Promise<T> {
        self.then(cx, move |cx, outcome| match outcome {
            Outcome::Cancelled => Promise::cancelled(cx),
            outcome => Promise::after(cx, delay, outcome),
        })
    }

    /// A promise that concludes with `outcome` once `delay` has elapsed.
    ///
    /// Cancelling it unschedules the pending timer.
    pub fn after(cx: &MainContext, delay: Duration, outcome: Outcome<T>) -> Promise<T> {
        let promise = Promise::pending(cx);
        let resolver = promise.resolver(cx);
        let timer = cx.post_after(delay, move |cx| resolver.resolve(cx, outcome));
        promise.on_cancel(cx, move |cx| {
            cx.cancel_timer(timer);
        });
        promise
    }

    /// Cancel `other` when this promise is cancelled.
    ///
    /// `other` is held weakly; if it is gone or already concluded by then,
    /// nothing happens. Other outcomes leave `other` alone.
    pub fn cancel_with<U>(&self, cx: &MainContext, other: &Promise<U>) -> Promise<()>
    where
        U: Clone + 'static,
    {
        let target = Rc::downgrade(&other.as_cancellable());
        self.then(cx, move |cx, outcome| {
            if outcome.is_cancelled() {
                if let Some(target) = target.upgrade() {
                    target.cancel(cx);
                }
            }
            Promise::concluded(cx, outcome.map(|_| ()))
        })
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Run `work` on a background thread and conclude with its outcome.
    ///
    /// The work cannot be stopped: if the promise is cancelled first, the work
    /// still runs to completion and its outcome is dropped. A panic inside
    /// `work` concludes the promise as failed.
    pub fn from_background<W>(cx: &MainContext, work: W) -> Promise<T>
    where
        W: FnOnce() -> Outcome<T> + Send + 'static,
    {
        let promise = Promise::pending(cx);
        let resolver = promise.resolver(cx);
        cx.spawn_background(work, move |cx, result| resolver.resolve(cx, settle(result)));
        promise
    }

    /// Like [`from_background`](Self::from_background), but the work receives
    /// a token that is cancelled when the promise is.
    pub fn from_background_cancellable<W>(cx: &MainContext, work: W) -> Promise<T>
    where
        W: FnOnce(&CancellationToken) -> Outcome<T> + Send + 'static,
    {
        let token = CancellationToken::new();
        let remote = token.clone();
        let promise = Promise::from_background(cx, move || work(&remote));
        promise.on_cancel(cx, move |_| token.cancel());
        promise
    }

    /// Chain `work` on a background thread; it receives this promise's outcome.
    pub fn then_in_background<U, W>(&self, cx: &MainContext, work: W) -> Promise<U>
    where
        U: Clone + Send + 'static,
        W: FnOnce(Outcome<T>) -> Outcome<U> + Send + 'static,
    {
        self.then(cx, move |cx, outcome| Promise::from_background(cx, move || work(outcome)))
    }

    /// Map a ready value on a background thread. Failures and cancellation pass
    /// through on the main context without a hop.
    pub fn map_in_background<U, F>(&self, cx: &MainContext, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.and_then(cx, move |cx, value| {
            Promise::from_background(cx, move || Outcome::Ready(f(value)))
        })
    }
}
