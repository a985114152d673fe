//! rust-minipromise: a promise runtime with explicit ownership and cooperative cancellation
//!
//! This crate provides assign-once promises that live on a single designated
//! execution context:
//! - Three-state outcomes (ready value, domain error, cancelled)
//! - One universal chaining combinator, [`Promise::then`], with every
//!   convenience (`map`, `and_then`, `on_ready`, `then_wait`, ...) built on it
//! - Ownership that flows along the chain: a parent keeps its pending children
//!   alive, and after re-parenting the intermediate promise does
//! - Downward cancellation by default, with an explicit upward walk
//!   ([`Promise::cancel_to_origin`])
//!
//! ## Execution Contexts
//!
//! All promise state is owned by a [`MainContext`]. Every core operation takes
//! `&MainContext` as a token and checks that the promise belongs to it. Work
//! that must run elsewhere (background threads, timers, network transports)
//! hands its result back through a [`Completer`], which re-enters the main
//! context exactly once.
//!
//! ## Examples
//!
//! ```rust
//! use rust_minipromise::{Outcome, Promise, Runtime};
//! use std::time::Duration;
//!
//! let runtime = Runtime::new().unwrap();
//! let cx = runtime.context();
//!
//! let source = Promise::<i32>::pending(cx);
//! let doubled = source
//!     .then(cx, |cx, outcome| Promise::concluded(cx, outcome.map(|x| x * 2)))
//!     .then_wait(cx, Duration::from_millis(5));
//!
//! source.conclude(cx, Outcome::Ready(5));
//! runtime.run();
//!
//! assert_eq!(doubled.outcome(), Some(Outcome::Ready(10)));
//! ```
//!
//! # Contract Violations
//!
//! Assigning an outcome twice, dropping a promise that never concluded, or
//! touching a promise from a foreign context are programmer errors. They are
//! reported as panics carrying a [`error::ContractViolation`] message and never
//! travel through the outcome channel.

pub mod background;
pub mod cancellation;
pub mod combinators;
pub mod config;
pub mod context;
pub mod controller;
pub mod executor;
pub mod fetch;
pub mod future;
pub mod holder;
pub mod observer;
pub mod outcome;
pub mod promise;
pub mod timer;

// Re-export core types
pub use cancellation::{Cancellable, CancellationToken};
pub use context::{Completer, ContextId, MainContext};
pub use controller::PromiseController;
pub use error::{BackgroundPanic, ContractViolation, DomainError, RuntimeError};
pub use executor::{Runtime, RuntimeBuilder};
pub use fetch::{AbortHandle, FetchError, FetchReply, FetchRequest, Fetcher};
pub use future::PromiseFuture;
pub use holder::PromiseHolder;
pub use observer::{InstanceCounter, PromiseObserver};
pub use outcome::{Outcome, OutcomeKind};
pub use promise::{Promise, PromiseId, Resolver};
pub use timer::{TimerId, TimerQueue};

/// Error types for the runtime
pub mod error {
    use crate::outcome::OutcomeKind;
    use crate::promise::PromiseId;
    use crate::context::ContextId;
    use std::fmt;
    use std::sync::Arc;
    use thiserror::Error;

    /// Broken invariants of the promise protocol.
    ///
    /// These never flow through an [`Outcome`](crate::Outcome); the runtime
    /// panics with the `Display` text of the violation at the point of detection.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum ContractViolation {
        #[error("contract violation: promise {id} already concluded as {existing}")]
        AlreadyConcluded { id: PromiseId, existing: OutcomeKind },

        #[error("contract violation: promise {id} dropped while pending")]
        DroppedWhilePending { id: PromiseId },

        #[error("contract violation: promise {id} belongs to context {owner}, touched from context {caller}")]
        ForeignContext {
            id: PromiseId,
            owner: ContextId,
            caller: ContextId,
        },

        #[error("contract violation: promise {id} resolved after it concluded as {existing}")]
        ResolvedAfterConclusion { id: PromiseId, existing: OutcomeKind },

        #[error("contract violation: promise {id} was returned as its own intermediate")]
        SelfIntermediate { id: PromiseId },
    }

    impl ContractViolation {
        /// Log the violation and abort the current thread of control.
        #[track_caller]
        pub(crate) fn raise(self) -> ! {
            tracing::error!("{}", self);
            panic!("{}", self)
        }
    }

    #[derive(Error, Debug)]
    pub enum RuntimeError {
        #[error("Failed to spawn background worker: {0}")]
        WorkerSpawn(#[from] std::io::Error),
    }

    pub type Result<T> = std::result::Result<T, RuntimeError>;

    /// A plain message used by [`DomainError::msg`].
    #[derive(Error, Debug)]
    #[error("{0}")]
    struct Message(String);

    /// Background work panicked before producing a result.
    #[derive(Error, Debug)]
    #[error("background work panicked: {message}")]
    pub struct BackgroundPanic {
        pub message: String,
    }

    impl BackgroundPanic {
        pub(crate) fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
            let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "<non-string panic payload>".to_string()
            };
            Self { message }
        }
    }

    /// Opaque domain error carried by [`Outcome::Failed`](crate::Outcome::Failed).
    ///
    /// Cloning is cheap; every continuation observing a failed promise receives
    /// the same underlying error.
    #[derive(Clone)]
    pub struct DomainError(Arc<dyn std::error::Error + Send + Sync + 'static>);

    impl DomainError {
        pub fn new<E>(error: E) -> Self
        where
            E: std::error::Error + Send + Sync + 'static,
        {
            Self(Arc::new(error))
        }

        pub fn msg(message: impl Into<String>) -> Self {
            Self::new(Message(message.into()))
        }

        pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
            self.0.downcast_ref::<E>()
        }

        /// Whether both handles share the same underlying error.
        pub fn ptr_eq(&self, other: &DomainError) -> bool {
            Arc::ptr_eq(&self.0, &other.0)
        }
    }

    impl fmt::Debug for DomainError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            fmt::Debug::fmt(&*self.0, f)
        }
    }

    impl fmt::Display for DomainError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            fmt::Display::fmt(&*self.0, f)
        }
    }

    impl std::error::Error for DomainError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            self.0.source()
        }
    }

    impl From<std::io::Error> for DomainError {
        fn from(error: std::io::Error) -> Self {
            Self::new(error)
        }
    }

    impl From<BackgroundPanic> for DomainError {
        fn from(error: BackgroundPanic) -> Self {
            Self::new(error)
        }
    }

    impl From<String> for DomainError {
        fn from(message: String) -> Self {
            Self::msg(message)
        }
    }

    impl From<&str> for DomainError {
        fn from(message: &str) -> Self {
            Self::msg(message)
        }
    }
}
