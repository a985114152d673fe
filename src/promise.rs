//! The promise state machine
//!
//! A [`Promise`] is a reference-counted handle to one node of eventual
//! computation. A node starts pending and concludes exactly once with an
//! [`Outcome`]. Continuations registered while it is pending run in
//! registration order when it concludes; continuations registered afterwards
//! run immediately.
//!
//! ## Ownership
//!
//! A node strongly owns its queued continuations, and a continuation created by
//! [`Promise::then`] strongly owns the child it will conclude. A pending child
//! is therefore kept alive by its parent; once the parent concludes, ownership
//! of the child moves to the intermediate promise produced by the user's
//! continuation. The link from a child back to the node currently responsible
//! for it (its *superpromise*) is a `Weak` edge and never keeps anything alive.
//!
//! Dropping the last handle of a pending node is a contract violation: nothing
//! could ever observe its outcome.
//!
//! ## Cancellation
//!
//! [`Promise::cancel`] concludes only the promise it is called on. Its
//! continuations still run and receive [`Outcome::Cancelled`], so dependents
//! reach a terminal state, but ancestors keep running.
//! [`Promise::cancel_to_origin`] additionally walks the superpromise chain and
//! cancels every ancestor that is still pending.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::cancellation::Cancellable;
use crate::context::{ContextId, JobQueue, MainContext};
use crate::error::{ContractViolation, DomainError};
use crate::observer::PromiseObserver;
use crate::outcome::{Outcome, OutcomeKind};

/// Identifies a promise within its context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseId(u64);

impl PromiseId {
    pub(crate) fn new(raw: u64) -> Self {
        PromiseId(raw)
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "promise#{}", self.0)
    }
}

type Continuation<T> = Box<dyn FnOnce(&MainContext, Outcome<T>)>;
type CancelHook = Box<dyn FnOnce(&MainContext)>;

/// A queued continuation and the child promise it will conclude, if any
struct Registration<T> {
    child: Option<PromiseId>,
    run: Continuation<T>,
}

struct State<T> {
    outcome: Option<Outcome<T>>,
    continuations: Vec<Registration<T>>,
    superpromise: Option<Weak<dyn Cancellable>>,
    on_cancel: Option<CancelHook>,
}

struct Node<T> {
    id: PromiseId,
    context: ContextId,
    state: RefCell<State<T>>,
    observer: Option<Rc<dyn PromiseObserver>>,
}

/// Handle to an assign-once eventual value owned by a [`MainContext`].
///
/// Cloning the handle adds an owner; it does not copy the promise.
pub struct Promise<T> {
    node: Rc<Node<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
        }
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// Create an unconcluded promise.
    pub fn pending(cx: &MainContext) -> Self {
        let id = cx.next_promise_id();
        let observer = cx.observer();
        if let Some(observer) = &observer {
            observer.created(id);
        }
        tracing::trace!("{} created in {}", id, cx.id());

        Self {
            node: Rc::new(Node {
                id,
                context: cx.id(),
                state: RefCell::new(State {
                    outcome: None,
                    continuations: Vec::new(),
                    superpromise: None,
                    on_cancel: None,
                }),
                observer,
            }),
        }
    }

    /// Create a promise that has already concluded with `outcome`.
    pub fn concluded(cx: &MainContext, outcome: Outcome<T>) -> Self {
        let promise = Self::pending(cx);
        promise.conclude(cx, outcome);
        promise
    }

    pub fn ready(cx: &MainContext, value: T) -> Self {
        Self::concluded(cx, Outcome::Ready(value))
    }

    pub fn failed(cx: &MainContext, error: impl Into<DomainError>) -> Self {
        Self::concluded(cx, Outcome::Failed(error.into()))
    }

    pub fn cancelled(cx: &MainContext) -> Self {
        Self::concluded(cx, Outcome::Cancelled)
    }

    /// Create a pending promise backed by an abortable operation.
    ///
    /// `hook` runs once, synchronously, if the promise is cancelled. Stopping
    /// the real work is the hook's job.
    pub fn with_cancel_hook<F>(cx: &MainContext, hook: F) -> Self
    where
        F: FnOnce(&MainContext) + 'static,
    {
        let promise = Self::pending(cx);
        promise.on_cancel(cx, hook);
        promise
    }

    pub fn id(&self) -> PromiseId {
        self.node.id
    }

    pub fn context(&self) -> ContextId {
        self.node.context
    }

    pub fn is_pending(&self) -> bool {
        self.node.state.borrow().outcome.is_none()
    }

    /// A copy of the outcome, or `None` while pending.
    pub fn outcome(&self) -> Option<Outcome<T>> {
        self.node.state.borrow().outcome.clone()
    }

    pub fn outcome_kind(&self) -> Option<OutcomeKind> {
        self.node.state.borrow().outcome.as_ref().map(Outcome::kind)
    }

    /// The node currently responsible for concluding this one, if still alive.
    pub fn superpromise(&self) -> Option<Rc<dyn Cancellable>> {
        self.node.superpromise()
    }

    /// A type-erased, cancel-capable view of this promise.
    pub fn as_cancellable(&self) -> Rc<dyn Cancellable> {
        self.node.clone()
    }

    /// Whether both handles refer to the same promise.
    pub fn ptr_eq(&self, other: &Promise<T>) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }

    /// Assign the outcome and run every queued continuation in registration order.
    ///
    /// # Panics
    ///
    /// Panics with a [`ContractViolation`] if the promise already concluded or
    /// belongs to another context.
    #[track_caller]
    pub fn conclude(&self, cx: &MainContext, outcome: Outcome<T>) {
        if let Err(violation) = self.try_conclude(cx, outcome) {
            violation.raise();
        }
    }

    /// Like [`conclude`](Self::conclude), but reports a second assignment as
    /// an error instead of panicking. Nothing is changed on error.
    pub fn try_conclude(&self, cx: &MainContext, outcome: Outcome<T>) -> Result<(), ContractViolation> {
        self.node.conclude(cx, outcome)
    }

    /// Conclude as [`Outcome::Cancelled`] unless already concluded.
    ///
    /// Continuations still run and observe the cancellation; ancestors are not
    /// touched.
    pub fn cancel(&self, cx: &MainContext) {
        self.node.cancel_node(cx);
    }

    /// Cancel this promise, then every still-pending superpromise up the chain.
    ///
    /// The walk visits each promise once, so a superpromise chain that loops
    /// back on itself still terminates.
    pub fn cancel_to_origin(&self, cx: &MainContext) {
        self.cancel(cx);
        let mut visited = HashSet::from([self.id()]);
        let mut current = self.superpromise();
        while let Some(node) = current {
            if !visited.insert(node.id()) {
                tracing::warn!("{} superpromise chain loops back to {}", self.id(), node.id());
                break;
            }
            node.cancel(cx);
            current = node.superpromise();
        }
    }

    /// Install the hook run when this promise is cancelled.
    ///
    /// If the promise is already cancelled the hook runs now; if it concluded
    /// otherwise the hook is dropped. A second hook replaces the first.
    pub fn on_cancel<F>(&self, cx: &MainContext, hook: F)
    where
        F: FnOnce(&MainContext) + 'static,
    {
        cx.check_owner(self.node.id, self.node.context);
        let kind = {
            let mut guard = self.node.state.borrow_mut();
            let state = &mut *guard;
            match &state.outcome {
                None => {
                    state.on_cancel = Some(Box::new(hook));
                    return;
                }
                Some(outcome) => outcome.kind(),
            }
        };
        if kind == OutcomeKind::Cancelled {
            hook(cx);
        }
    }

    /// A [`Resolver`] that concludes this promise from an operation.
    ///
    /// The resolver owns the promise until it is used or dropped. Dropping it
    /// unused cancels the promise on the next pass of the runtime loop.
    pub fn resolver(&self, cx: &MainContext) -> Resolver<T> {
        cx.check_owner(self.node.id, self.node.context);
        Resolver {
            promise: self.clone(),
            node: self.node.clone(),
            jobs: cx.job_queue(),
        }
    }

    /// Chain a continuation.
    ///
    /// Returns a pending child immediately. Once this promise concludes,
    /// `continuation` receives its outcome and returns an intermediate promise;
    /// the child then mirrors that promise's outcome. If this promise has
    /// already concluded, `continuation` runs before `then` returns.
    ///
    /// Cancelling the child while the intermediate is still running drops the
    /// intermediate's eventual result.
    pub fn then<U, F>(&self, cx: &MainContext, continuation: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(&MainContext, Outcome<T>) -> Promise<U> + 'static,
    {
        cx.check_owner(self.node.id, self.node.context);

        let child = Promise::<U>::pending(cx);
        let parent: Rc<dyn Cancellable> = self.node.clone();
        child.set_superpromise(Rc::downgrade(&parent));
        tracing::trace!("{} chained from {}", child.id(), self.id());

        let retained = child.clone();
        self.subscribe(
            cx,
            Some(child.id()),
            Box::new(move |cx: &MainContext, outcome: Outcome<T>| {
                let intermediate = continuation(cx, outcome);
                retained.adopt(cx, &intermediate);
            }),
        );
        child
    }

    /// Run `continuation` with the outcome now, or queue it until conclusion.
    ///
    /// `child` keys the registration so a cancelled child can withdraw it.
    fn subscribe(&self, cx: &MainContext, child: Option<PromiseId>, continuation: Continuation<T>) {
        let outcome = {
            let mut guard = self.node.state.borrow_mut();
            let state = &mut *guard;
            match &state.outcome {
                Some(outcome) => outcome.clone(),
                None => {
                    state.continuations.push(Registration {
                        child,
                        run: continuation,
                    });
                    return;
                }
            }
        };
        continuation(cx, outcome);
    }

    /// Make `intermediate` responsible for this promise and mirror its outcome.
    ///
    /// Consumes the handle: from here on the continuation queued on
    /// `intermediate` is what keeps this promise alive.
    fn adopt(self, cx: &MainContext, intermediate: &Promise<T>) {
        cx.check_owner(intermediate.node.id, intermediate.node.context);
        if self.ptr_eq(intermediate) {
            ContractViolation::SelfIntermediate { id: self.id() }.raise();
        }
        match self.outcome_kind() {
            None => {
                let target: Rc<dyn Cancellable> = intermediate.node.clone();
                self.set_superpromise(Rc::downgrade(&target));
            }
            Some(OutcomeKind::Cancelled) => {
                tracing::trace!("{} was cancelled before {} was produced", self.id(), intermediate.id());
                return;
            }
            Some(existing) => ContractViolation::AlreadyConcluded {
                id: self.id(),
                existing,
            }
            .raise(),
        }

        let key = Some(self.id());
        intermediate.subscribe(
            cx,
            key,
            Box::new(move |cx: &MainContext, outcome: Outcome<T>| match self.outcome_kind() {
                None => self.conclude(cx, outcome),
                Some(OutcomeKind::Cancelled) => {
                    tracing::trace!(
                        "{} was cancelled; dropping {} result of its intermediate",
                        self.id(),
                        outcome.kind()
                    );
                }
                Some(existing) => ContractViolation::AlreadyConcluded {
                    id: self.id(),
                    existing,
                }
                .raise(),
            }),
        );
    }

    fn set_superpromise(&self, superpromise: Weak<dyn Cancellable>) {
        self.node.state.borrow_mut().superpromise = Some(superpromise);
    }
}

impl<T: Clone + 'static> Node<T> {
    fn conclude(&self, cx: &MainContext, outcome: Outcome<T>) -> Result<(), ContractViolation> {
        cx.check_owner(self.id, self.context);

        let kind = outcome.kind();
        let (continuations, hook) = {
            let mut state = self.state.borrow_mut();
            if let Some(existing) = &state.outcome {
                return Err(ContractViolation::AlreadyConcluded {
                    id: self.id,
                    existing: existing.kind(),
                });
            }
            state.outcome = Some(outcome.clone());
            (
                std::mem::take(&mut state.continuations),
                state.on_cancel.take(),
            )
        };

        tracing::trace!("{} concluded as {} ({} continuations)", self.id, kind, continuations.len());
        if let Some(observer) = &self.observer {
            observer.concluded(self.id, kind);
        }

        if kind == OutcomeKind::Cancelled {
            if let Some(hook) = hook {
                hook(cx);
            }
        } else {
            drop(hook);
        }

        for registration in continuations {
            (registration.run)(cx, outcome.clone());
        }
        Ok(())
    }

    fn cancel_node(&self, cx: &MainContext) {
        cx.check_owner(self.id, self.context);
        if self.state.borrow().outcome.is_some() {
            return;
        }
        tracing::debug!("{} cancelled", self.id);
        // Pending was checked above and nothing ran in between.
        let _ = self.conclude(cx, Outcome::Cancelled);

        if let Some(superpromise) = self.superpromise() {
            superpromise.detach(self.id);
        }
    }

    /// Drop the queued registrations that would conclude `child`.
    fn detach_child(&self, child: PromiseId) {
        let removed: Vec<Registration<T>> = {
            let mut state = self.state.borrow_mut();
            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.continuations)
                .into_iter()
                .partition(|registration| registration.child == Some(child));
            state.continuations = kept;
            removed
        };
        if !removed.is_empty() {
            tracing::trace!("{} released continuation of cancelled {}", self.id, child);
        }
        // Closures are dropped here, after the state borrow is released.
        drop(removed);
    }

    fn superpromise(&self) -> Option<Rc<dyn Cancellable>> {
        self.state
            .borrow()
            .superpromise
            .as_ref()
            .and_then(Weak::upgrade)
    }
}

impl<T: Clone + 'static> Cancellable for Node<T> {
    fn id(&self) -> PromiseId {
        self.id
    }

    fn is_pending(&self) -> bool {
        self.state.borrow().outcome.is_none()
    }

    fn cancel(&self, cx: &MainContext) {
        self.cancel_node(cx);
    }

    fn detach(&self, child: PromiseId) {
        self.detach_child(child);
    }

    fn superpromise(&self) -> Option<Rc<dyn Cancellable>> {
        Node::superpromise(self)
    }
}

impl<T> Drop for Node<T> {
    fn drop(&mut self) {
        if let Some(observer) = &self.observer {
            observer.destroyed(self.id);
        }
        // A second panic while unwinding would abort the process.
        if self.state.get_mut().outcome.is_none() && !std::thread::panicking() {
            ContractViolation::DroppedWhilePending { id: self.id }.raise();
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.node.state.borrow();
        f.debug_struct("Promise")
            .field("id", &self.node.id)
            .field("context", &self.node.context)
            .field("outcome", &state.outcome.as_ref().map(Outcome::kind))
            .field("continuations", &state.continuations.len())
            .finish()
    }
}

/// Concludes a promise on behalf of an operation running elsewhere.
///
/// An operation's result may arrive after its promise was cancelled; the
/// resolver drops such a result instead of overwriting the cancellation.
///
/// A resolver dropped without resolving means the operation is gone for good,
/// so its still-pending promise is cancelled.
pub struct Resolver<T> {
    promise: Promise<T>,
    node: Rc<dyn Cancellable>,
    jobs: Weak<JobQueue>,
}

impl<T: Clone + 'static> Resolver<T> {
    pub fn promise(&self) -> &Promise<T> {
        &self.promise
    }

    pub fn is_cancelled(&self) -> bool {
        self.promise.outcome_kind() == Some(OutcomeKind::Cancelled)
    }

    /// # Panics
    ///
    /// Panics with a [`ContractViolation`] if the promise concluded with
    /// anything other than a cancellation in the meantime.
    pub fn resolve(self, cx: &MainContext, outcome: Outcome<T>) {
        match self.promise.outcome_kind() {
            None => self.promise.conclude(cx, outcome),
            Some(OutcomeKind::Cancelled) => {
                tracing::trace!(
                    "{} resolved after cancellation; dropping {} result",
                    self.promise.id(),
                    outcome.kind()
                );
            }
            Some(existing) => ContractViolation::ResolvedAfterConclusion {
                id: self.promise.id(),
                existing,
            }
            .raise(),
        }
    }

    pub fn ready(self, cx: &MainContext, value: T) {
        self.resolve(cx, Outcome::Ready(value));
    }

    pub fn fail(self, cx: &MainContext, error: impl Into<DomainError>) {
        self.resolve(cx, Outcome::Failed(error.into()));
    }
}

impl<T> Drop for Resolver<T> {
    fn drop(&mut self) {
        if !self.node.is_pending() {
            return;
        }
        // The context is not at hand here; cancel from its job queue instead.
        if let Some(jobs) = self.jobs.upgrade() {
            tracing::debug!("{} lost its resolver; cancelling", self.node.id());
            let node = self.node.clone();
            jobs.borrow_mut()
                .push_back(Box::new(move |cx: &MainContext| node.cancel(cx)));
        }
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("promise", &self.promise.node.id)
            .finish()
    }
}
