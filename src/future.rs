//! `std::future::Future` adapter for promises
//!
//! A [`PromiseFuture`] lets async code await a promise. It registers a
//! continuation through the normal chaining path and wakes the stored waker
//! when the promise concludes. The promise itself is still driven by the
//! runtime loop; awaiting does not block the main context.

use std::cell::RefCell;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::context::MainContext;
use crate::outcome::Outcome;
use crate::promise::Promise;

/// A future that resolves to the outcome of a promise
pub struct PromiseFuture<T> {
    shared: Rc<RefCell<SharedState<T>>>,
}

/// Shared state between the future and the promise continuation
struct SharedState<T> {
    outcome: Option<Outcome<T>>,
    waker: Option<Waker>,
}

impl<T> PromiseFuture<T> {
    /// Check if the outcome has arrived without polling
    pub fn is_ready(&self) -> bool {
        self.shared.borrow().outcome.is_some()
    }
}

impl<T: Clone> std::future::Future for PromiseFuture<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut guard = self.shared.borrow_mut();
        let shared = &mut *guard;

        match &shared.outcome {
            Some(outcome) => Poll::Ready(outcome.clone()),
            None => {
                // Store the waker for later notification
                shared.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// A future that resolves to this promise's outcome.
    pub fn to_future(&self, cx: &MainContext) -> PromiseFuture<T> {
        let shared = Rc::new(RefCell::new(SharedState {
            outcome: None,
            waker: None,
        }));

        let sink = shared.clone();
        let _ = self.on_outcome(cx, move |outcome| {
            let waker = {
                let mut state = sink.borrow_mut();
                state.outcome = Some(outcome.clone());
                state.waker.take()
            };
            if let Some(waker) = waker {
                waker.wake();
            }
        });

        PromiseFuture { shared }
    }
}

impl<T> std::fmt::Debug for PromiseFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromiseFuture")
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Runtime;
    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;

    #[test]
    fn test_future_of_concluded_promise_is_ready() {
        let rt = Runtime::builder().background_threads(1).build().unwrap();
        let cx = rt.context();
        let future = Promise::ready(cx, 5).to_future(cx);
        assert!(future.is_ready());
        assert_eq!(futures::executor::block_on(future), Outcome::Ready(5));
    }

    #[test]
    fn test_waker_fires_on_conclusion() {
        let rt = Runtime::builder().background_threads(1).build().unwrap();
        let cx = rt.context();
        let mut pool = LocalPool::new();
        let received = Rc::new(RefCell::new(None));

        let promise = Promise::<&str>::pending(cx);
        let future = promise.to_future(cx);
        let slot = received.clone();
        pool.spawner()
            .spawn_local(async move {
                *slot.borrow_mut() = Some(future.await);
            })
            .unwrap();

        pool.run_until_stalled();
        assert!(received.borrow().is_none());

        let resolver = promise.resolver(cx);
        cx.post(move |cx| resolver.ready(cx, "done"));
        rt.run();
        pool.run_until_stalled();

        assert_eq!(*received.borrow(), Some(Outcome::Ready("done")));
    }
}
