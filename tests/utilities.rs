//! Holder, controller and fetch wrappers

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use http::Uri;
use rust_minipromise::{
    AbortHandle, Completer, FetchReply, FetchRequest, Fetcher, Outcome, Promise, PromiseController,
    PromiseHolder,
};

#[test]
fn test_holder_keeps_fire_and_forget_chain_alive() {
    let rt = common::runtime();
    let cx = rt.context();
    let holder = PromiseHolder::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let sink = log.clone();
    let chain = Promise::after(cx, Duration::from_millis(3), Outcome::Ready("tick"))
        .on_ready(cx, move |v| sink.borrow_mut().push(v));
    holder.hold(cx, &chain);
    drop(chain);

    assert_eq!(holder.len(), 1);
    rt.run();
    assert!(holder.is_empty());
    assert_eq!(*log.borrow(), vec!["tick"]);
}

#[test]
fn test_holder_cancel_all_unschedules_work() {
    let rt = common::runtime();
    let cx = rt.context();
    let holder = PromiseHolder::new();

    for delay in [10u64, 20, 30] {
        holder.hold(cx, &Promise::after(cx, Duration::from_secs(delay), Outcome::Ready(delay)));
    }
    holder.cancel_all(cx);

    assert!(holder.is_empty());
    assert!(rt.is_idle());
}

#[test]
fn test_controller_keeps_only_latest_run() {
    let rt = common::runtime();
    let cx = rt.context();
    let mut runs = 0u32;
    let mut controller = PromiseController::new(move |cx| {
        runs += 1;
        let run = runs;
        Promise::from_background(cx, move || Outcome::Ready(run))
    });

    let first = controller.run(cx);
    let second = controller.run(cx);
    let third = controller.run(cx);
    rt.run();

    assert!(first.outcome().unwrap().is_cancelled());
    assert!(second.outcome().unwrap().is_cancelled());
    assert_eq!(third.outcome(), Some(Outcome::Ready(3)));
}

/// Holds completers until the test decides how each transfer ends.
#[derive(Default)]
struct ManualFetcher {
    pending: Arc<Mutex<Vec<(FetchRequest, Completer<FetchReply>)>>>,
    aborts: Arc<AtomicUsize>,
}

struct ManualAbort(Arc<AtomicUsize>);

impl AbortHandle for ManualAbort {
    fn abort(self: Box<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl Fetcher for ManualFetcher {
    fn fetch(&self, request: FetchRequest, completer: Completer<FetchReply>) -> Box<dyn AbortHandle> {
        self.pending.lock().unwrap().push((request, completer));
        Box::new(ManualAbort(self.aborts.clone()))
    }
}

#[test]
fn test_fetch_cancellation_aborts_once() {
    let rt = common::runtime();
    let cx = rt.context();
    let fetcher = ManualFetcher::default();

    let body = Promise::<Bytes>::fetch(cx, &fetcher, FetchRequest::get(Uri::from_static("http://example.test/slow")));
    body.cancel(cx);
    body.cancel(cx);
    assert_eq!(fetcher.aborts.load(Ordering::SeqCst), 1);

    // The transport reports the abort late; the promise stays cancelled.
    let (_, completer) = fetcher.pending.lock().unwrap().pop().unwrap();
    thread::spawn(move || completer.complete(FetchReply::Aborted)).join().unwrap();
    rt.run();

    assert_eq!(body.outcome(), Some(Outcome::Cancelled));
}

#[test]
fn test_then_fetch_uses_produced_request() {
    let rt = common::runtime();
    let cx = rt.context();
    let fetcher = Rc::new(ManualFetcher::default());
    let pending = fetcher.pending.clone();

    let body = Promise::ready(cx, "/items/7")
        .map(cx, |path| FetchRequest::get(format!("http://example.test{}", path).parse::<Uri>().unwrap()))
        .then_fetch(cx, fetcher.clone());

    let (request, completer) = pending.lock().unwrap().pop().unwrap();
    assert_eq!(request.uri.path(), "/items/7");
    thread::spawn(move || completer.complete(FetchReply::Data(Bytes::from_static(b"seven"))));
    rt.run();

    assert_eq!(body.outcome(), Some(Outcome::Ready(Bytes::from_static(b"seven"))));
    assert_eq!(fetcher.aborts.load(Ordering::SeqCst), 0);
}
