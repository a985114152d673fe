//! The designated execution context
//!
//! A [`MainContext`] owns every promise created through it. It is the only
//! place promise state may be mutated, and it is passed as `&MainContext` to
//! every core operation as proof that the caller is running on it.
//!
//! `MainContext` is neither `Send` nor `Sync`, so a promise cannot be touched
//! from another thread at all; work that runs elsewhere reports back through a
//! [`Completer`], which re-enters the context from the runtime loop.
//!
//! The context also carries the dispatch services a promise chain needs:
//! - [`MainContext::post`]: run a job later on this context
//! - [`MainContext::post_after`]: run a job on this context after a delay
//! - [`MainContext::spawn_background`]: run work on a background thread and
//!   hand its result back here

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::background::BackgroundPool;
use crate::error::{ContractViolation, Result};
use crate::observer::PromiseObserver;
use crate::promise::PromiseId;
use crate::timer::{TimerId, TimerQueue};

/// A job queued for execution on the main context
pub(crate) type Job = Box<dyn FnOnce(&MainContext)>;
pub(crate) type JobQueue = RefCell<VecDeque<Job>>;

/// Continuation waiting on a value produced elsewhere
type Slot = Box<dyn FnOnce(&MainContext, Box<dyn Any + Send>)>;

/// Identifies one execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

impl ContextId {
    fn next() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cx#{}", self.0)
    }
}

/// Messages crossing from other threads into the main context
enum Envelope {
    Completed {
        slot: u64,
        value: Box<dyn Any + Send>,
    },
    Abandoned {
        slot: u64,
    },
}

/// The single execution context allowed to mutate promise state.
pub struct MainContext {
    id: ContextId,
    name: String,
    jobs: Rc<JobQueue>,
    timers: RefCell<TimerQueue<Job>>,
    slots: RefCell<HashMap<u64, Slot>>,
    next_slot: Cell<u64>,
    next_promise: Cell<u64>,
    inbox_tx: Sender<Envelope>,
    inbox_rx: Receiver<Envelope>,
    observer: Option<Rc<dyn PromiseObserver>>,
    pool: BackgroundPool,
}

impl MainContext {
    pub(crate) fn new(
        name: String,
        background_threads: usize,
        observer: Option<Rc<dyn PromiseObserver>>,
    ) -> Result<Self> {
        let pool = BackgroundPool::new(&name, background_threads)?;
        let (inbox_tx, inbox_rx) = unbounded();
        let id = ContextId::next();
        tracing::debug!("Created main context {} ({})", id, name);

        Ok(Self {
            id,
            name,
            jobs: Rc::new(RefCell::new(VecDeque::new())),
            timers: RefCell::new(TimerQueue::new()),
            slots: RefCell::new(HashMap::new()),
            next_slot: Cell::new(1),
            next_promise: Cell::new(1),
            inbox_tx,
            inbox_rx,
            observer,
            pool,
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schedule `job` to run later on this context, after jobs already queued.
    pub fn post<F>(&self, job: F)
    where
        F: FnOnce(&MainContext) + 'static,
    {
        self.jobs.borrow_mut().push_back(Box::new(job));
    }

    /// Handle for queueing jobs from places that have no context at hand.
    pub(crate) fn job_queue(&self) -> Weak<JobQueue> {
        Rc::downgrade(&self.jobs)
    }

    /// Schedule `job` to run on this context once `delay` has elapsed.
    pub fn post_after<F>(&self, delay: Duration, job: F) -> TimerId
    where
        F: FnOnce(&MainContext) + 'static,
    {
        let at = Instant::now() + delay;
        let id = self.timers.borrow_mut().schedule(at, Box::new(job));
        tracing::trace!("{} scheduled {} in {:?}", self.id, id, delay);
        id
    }

    /// Cancel a delayed job. Returns false if it already ran or was cancelled.
    ///
    /// The job is dropped after the timer queue is released, so dropping it may
    /// itself touch the context.
    pub fn cancel_timer(&self, id: TimerId) -> bool {
        let job = self.timers.borrow_mut().cancel(id);
        let found = job.is_some();
        drop(job);
        if found {
            tracing::trace!("{} cancelled {}", self.id, id);
        }
        found
    }

    /// Register `on_complete` to run on this context when the returned
    /// [`Completer`] delivers a value from any thread.
    pub fn completer<R, F>(&self, on_complete: F) -> Completer<R>
    where
        R: Send + 'static,
        F: FnOnce(&MainContext, R) + 'static,
    {
        let slot = self.next_slot.get();
        self.next_slot.set(slot + 1);

        let callback: Slot = Box::new(move |cx: &MainContext, value: Box<dyn Any + Send>| match value.downcast::<R>() {
            Ok(value) => on_complete(cx, *value),
            Err(_) => tracing::error!("{} received a mistyped value for slot {}", cx.id, slot),
        });
        self.slots.borrow_mut().insert(slot, callback);

        Completer {
            slot,
            inbox: self.inbox_tx.clone(),
            delivered: false,
            _value: PhantomData,
        }
    }

    /// Run `work` on a background thread, then `on_complete` on this context.
    ///
    /// A panic inside `work` is caught on the worker and delivered as `Err`.
    pub fn spawn_background<R, W, F>(&self, work: W, on_complete: F)
    where
        R: Send + 'static,
        W: FnOnce() -> R + Send + 'static,
        F: FnOnce(&MainContext, std::thread::Result<R>) + 'static,
    {
        let completer = self.completer(on_complete);
        self.pool.execute(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(work));
            completer.complete(result);
        });
    }

    /// Number of completions registered and not yet delivered.
    pub fn in_flight(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Number of background workers.
    pub fn background_threads(&self) -> usize {
        self.pool.worker_count()
    }

    /// Fail fast if a promise owned by `owner` is touched from this context.
    pub(crate) fn check_owner(&self, promise: PromiseId, owner: ContextId) {
        if owner != self.id {
            ContractViolation::ForeignContext {
                id: promise,
                owner,
                caller: self.id,
            }
            .raise();
        }
    }

    pub(crate) fn next_promise_id(&self) -> PromiseId {
        let id = self.next_promise.get();
        self.next_promise.set(id + 1);
        PromiseId::new(id)
    }

    pub(crate) fn observer(&self) -> Option<Rc<dyn PromiseObserver>> {
        self.observer.clone()
    }

    /// Run every queued job, including jobs queued while draining.
    pub(crate) fn run_jobs(&self) -> bool {
        let mut made_progress = false;
        loop {
            let job = self.jobs.borrow_mut().pop_front();
            match job {
                Some(job) => {
                    job(self);
                    made_progress = true;
                }
                None => break,
            }
        }
        made_progress
    }

    /// Fire every delayed job whose deadline has passed.
    pub(crate) fn fire_timers(&self, now: Instant) -> bool {
        let mut ready = Vec::new();
        self.timers.borrow_mut().expire(now, &mut ready);
        let made_progress = !ready.is_empty();
        for job in ready {
            job(self);
        }
        made_progress
    }

    /// Deliver everything already waiting in the inbox.
    pub(crate) fn drain_inbox(&self) -> bool {
        let mut made_progress = false;
        while let Ok(envelope) = self.inbox_rx.try_recv() {
            self.deliver(envelope);
            made_progress = true;
        }
        made_progress
    }

    /// Block on the inbox for at most `timeout`, delivering one envelope.
    pub(crate) fn wait_inbox(&self, timeout: Duration) -> bool {
        match self.inbox_rx.recv_timeout(timeout) {
            Ok(envelope) => {
                self.deliver(envelope);
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            // We hold a sender ourselves, so the channel cannot disconnect.
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    pub(crate) fn has_queued_jobs(&self) -> bool {
        !self.jobs.borrow().is_empty()
    }

    pub(crate) fn pending_timers(&self) -> usize {
        self.timers.borrow().pending_count()
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.timers.borrow().next_deadline()
    }

    fn deliver(&self, envelope: Envelope) {
        match envelope {
            Envelope::Completed { slot, value } => {
                let callback = self.slots.borrow_mut().remove(&slot);
                match callback {
                    Some(callback) => callback(self, value),
                    None => tracing::warn!("{} got a value for unknown slot {}", self.id, slot),
                }
            }
            Envelope::Abandoned { slot } => {
                let callback = self.slots.borrow_mut().remove(&slot);
                if callback.is_some() {
                    tracing::warn!("{} completion slot {} abandoned without a value", self.id, slot);
                }
                drop(callback);
            }
        }
    }
}

impl fmt::Debug for MainContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("queued_jobs", &self.jobs.borrow().len())
            .field("pending_timers", &self.timers.borrow().pending_count())
            .field("in_flight", &self.slots.borrow().len())
            .finish()
    }
}

/// Sends exactly one value back to the main context that created it.
///
/// `Completer` is `Send`: it is what background threads, transports and other
/// foreign code hold. Dropping it without calling [`complete`](Self::complete)
/// tells the context the value will never arrive.
pub struct Completer<R> {
    slot: u64,
    inbox: Sender<Envelope>,
    delivered: bool,
    _value: PhantomData<fn(R)>,
}

impl<R: Send + 'static> Completer<R> {
    pub fn complete(mut self, value: R) {
        self.delivered = true;
        let envelope = Envelope::Completed {
            slot: self.slot,
            value: Box::new(value),
        };
        if self.inbox.send(envelope).is_err() {
            tracing::warn!("Main context is gone; dropping completion for slot {}", self.slot);
        }
    }
}

impl<R> Drop for Completer<R> {
    fn drop(&mut self) {
        if !self.delivered {
            let _ = self.inbox.send(Envelope::Abandoned { slot: self.slot });
        }
    }
}

impl<R> fmt::Debug for Completer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer")
            .field("slot", &self.slot)
            .field("delivered", &self.delivered)
            .finish()
    }
}
