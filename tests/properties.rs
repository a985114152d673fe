//! Property tests for ordering and assign-once

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use rust_minipromise::{DomainError, Outcome, OutcomeKind, Promise, Runtime};

fn outcome_strategy() -> impl Strategy<Value = Outcome<i32>> {
    prop_oneof![
        any::<i32>().prop_map(Outcome::Ready),
        "[a-z]{1,8}".prop_map(|m| Outcome::Failed(DomainError::msg(m))),
        Just(Outcome::Cancelled),
    ]
}

fn small_runtime() -> Runtime {
    common::setup_tracing();
    Runtime::builder().background_threads(1).build().unwrap()
}

proptest! {
    #[test]
    fn prop_continuations_fire_in_registration_order(early in prop::collection::vec(any::<bool>(), 1..24)) {
        let rt = small_runtime();
        let cx = rt.context();
        let source = Promise::<i32>::pending(cx);
        let fired = Rc::new(RefCell::new(Vec::new()));
        let mut tails = Vec::new();

        // Early registrations queue; late ones fire synchronously, so the
        // observed order is registration order either way.
        let (before, after): (Vec<_>, Vec<_>) = early.iter().enumerate().partition(|(_, e)| **e);
        let mut order = Vec::new();
        for (index, _) in &before {
            let log = fired.clone();
            let index = *index;
            tails.push(source.on_outcome(cx, move |_| log.borrow_mut().push(index)));
            order.push(index);
        }
        source.conclude(cx, Outcome::Ready(0));
        for (index, _) in &after {
            let log = fired.clone();
            let index = *index;
            tails.push(source.on_outcome(cx, move |_| log.borrow_mut().push(index)));
            order.push(index);
        }

        prop_assert_eq!(&*fired.borrow(), &order);
        prop_assert!(tails.iter().all(|t| !t.is_pending()));
    }

    #[test]
    fn prop_outcome_is_assigned_once(first in outcome_strategy(), second in outcome_strategy()) {
        let rt = small_runtime();
        let cx = rt.context();
        let promise = Promise::<i32>::pending(cx);

        let kind = first.kind();
        promise.conclude(cx, first.clone());
        let rejected = promise.try_conclude(cx, second);

        prop_assert!(rejected.is_err());
        prop_assert_eq!(promise.outcome(), Some(first));
        prop_assert_eq!(promise.outcome_kind(), Some(kind));
    }

    #[test]
    fn prop_map_identity_preserves_outcome(outcome in outcome_strategy()) {
        let rt = small_runtime();
        let cx = rt.context();
        let source = Promise::<i32>::pending(cx);
        let mapped = source.map(cx, |x| x);

        source.conclude(cx, outcome.clone());
        prop_assert_eq!(mapped.outcome(), Some(outcome));
    }

    #[test]
    fn prop_cancelled_descendants_never_recover(depth in 1usize..12, cut in 0usize..12, value in any::<i32>()) {
        let rt = small_runtime();
        let cx = rt.context();
        let root = Promise::<i32>::pending(cx);
        let mut chain = vec![root.clone()];
        for _ in 0..depth {
            let next = chain.last().unwrap().map(cx, |x| x.wrapping_add(1));
            chain.push(next);
        }

        let cut = cut.min(depth);
        chain[cut].cancel(cx);
        root.try_conclude(cx, Outcome::Ready(value)).ok();

        for (level, promise) in chain.iter().enumerate() {
            let kind = promise.outcome_kind();
            if level < cut {
                prop_assert_eq!(kind, Some(OutcomeKind::Ready));
            } else {
                prop_assert_eq!(kind, Some(OutcomeKind::Cancelled));
            }
        }
    }
}
