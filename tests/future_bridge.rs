//! Awaiting promises from a local async executor

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use rust_minipromise::{Outcome, Promise};

#[test]
fn test_await_delayed_chain() {
    let rt = common::runtime();
    let cx = rt.context();
    let mut pool = LocalPool::new();
    let results = Rc::new(RefCell::new(Vec::new()));

    let first = Promise::after(cx, Duration::from_millis(4), Outcome::Ready(1)).to_future(cx);
    let second = Promise::from_background(cx, || Outcome::Ready(2)).to_future(cx);

    let sink = results.clone();
    pool.spawner()
        .spawn_local(async move {
            let a = first.await;
            let b = second.await;
            sink.borrow_mut().push((a, b));
        })
        .unwrap();

    pool.run_until_stalled();
    assert!(results.borrow().is_empty());

    rt.run();
    pool.run_until_stalled();
    assert_eq!(*results.borrow(), vec![(Outcome::Ready(1), Outcome::Ready(2))]);
}

#[test]
fn test_await_sees_cancellation() {
    let rt = common::runtime();
    let cx = rt.context();
    let mut pool = LocalPool::new();

    let promise = Promise::<u8>::pending(cx);
    let future = promise.to_future(cx);
    let handle = pool.spawner().spawn_local_with_handle(future).unwrap();

    promise.cancel(cx);
    assert_eq!(pool.run_until(handle), Outcome::Cancelled);
}
