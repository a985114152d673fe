//! Promise outcomes
//!
//! An [`Outcome`] is the terminal, assign-once value of a promise. It is a
//! closed sum type; every consumer matches all three variants.

use std::fmt;

use crate::error::DomainError;

/// The conclusion of a promise.
#[derive(Clone, Debug)]
pub enum Outcome<T> {
    /// The computation produced a value.
    Ready(T),
    /// The computation raised a domain error.
    Failed(DomainError),
    /// The promise (or the promise governing it) was cancelled before a value
    /// was produced.
    Cancelled,
}

/// Which of the three outcomes a promise reached, without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Ready,
    Failed,
    Cancelled,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutcomeKind::Ready => "ready",
            OutcomeKind::Failed => "failed",
            OutcomeKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

impl<T> Outcome<T> {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Ready(_) => OutcomeKind::Ready,
            Outcome::Failed(_) => OutcomeKind::Failed,
            Outcome::Cancelled => OutcomeKind::Cancelled,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Outcome::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Ready(value) => Some(value),
            Outcome::Failed(_) | Outcome::Cancelled => None,
        }
    }

    pub fn error(&self) -> Option<&DomainError> {
        match self {
            Outcome::Failed(error) => Some(error),
            Outcome::Ready(_) | Outcome::Cancelled => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Ready(value) => Some(value),
            Outcome::Failed(_) | Outcome::Cancelled => None,
        }
    }

    pub fn as_ref(&self) -> Outcome<&T> {
        match self {
            Outcome::Ready(value) => Outcome::Ready(value),
            Outcome::Failed(error) => Outcome::Failed(error.clone()),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    /// Transform a ready value; failures and cancellation pass through untouched.
    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Outcome::Ready(value) => Outcome::Ready(f(value)),
            Outcome::Failed(error) => Outcome::Failed(error),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    /// Like [`map`](Self::map), but the transform may fail. Its error becomes
    /// [`Outcome::Failed`].
    pub fn try_map<U, E, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> Result<U, E>,
        E: Into<DomainError>,
    {
        match self {
            Outcome::Ready(value) => match f(value) {
                Ok(mapped) => Outcome::Ready(mapped),
                Err(error) => Outcome::Failed(error.into()),
            },
            Outcome::Failed(error) => Outcome::Failed(error),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    pub fn and_then<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> Outcome<U>,
    {
        match self {
            Outcome::Ready(value) => f(value),
            Outcome::Failed(error) => Outcome::Failed(error),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    /// `None` for a cancelled outcome.
    pub fn into_result(self) -> Option<Result<T, DomainError>> {
        match self {
            Outcome::Ready(value) => Some(Ok(value)),
            Outcome::Failed(error) => Some(Err(error)),
            Outcome::Cancelled => None,
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T>
where
    E: Into<DomainError>,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Ready(value),
            Err(error) => Outcome::Failed(error.into()),
        }
    }
}

/// Failed outcomes compare equal only when they share the same error instance.
impl<T: PartialEq> PartialEq for Outcome<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Outcome::Ready(a), Outcome::Ready(b)) => a == b,
            (Outcome::Failed(a), Outcome::Failed(b)) => a.ptr_eq(b),
            (Outcome::Cancelled, Outcome::Cancelled) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_accessors() {
        let ready: Outcome<i32> = Outcome::Ready(3);
        assert_eq!(ready.kind(), OutcomeKind::Ready);
        assert_eq!(ready.value(), Some(&3));
        assert!(ready.error().is_none());

        let failed: Outcome<i32> = Outcome::Failed(DomainError::msg("boom"));
        assert!(failed.is_failed());
        assert_eq!(failed.error().map(|e| e.to_string()), Some("boom".to_string()));

        let cancelled: Outcome<i32> = Outcome::Cancelled;
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.into_value(), None);
    }

    #[test]
    fn test_map_passes_failures_through() {
        let error = DomainError::msg("nope");
        let failed: Outcome<i32> = Outcome::Failed(error.clone());
        let mapped = failed.map(|x| x + 1);
        assert!(mapped.error().is_some_and(|e| e.ptr_eq(&error)));

        let cancelled: Outcome<i32> = Outcome::Cancelled;
        assert_eq!(cancelled.map(|x| x + 1), Outcome::Cancelled);
    }

    #[test]
    fn test_try_map_turns_error_into_failed() {
        let ready: Outcome<&str> = Outcome::Ready("12x");
        let parsed = ready.try_map(|s| s.parse::<i32>().map_err(|e| DomainError::msg(e.to_string())));
        assert!(parsed.is_failed());

        let ready: Outcome<&str> = Outcome::Ready("12");
        let parsed = ready.try_map(|s| s.parse::<i32>().map_err(|e| DomainError::msg(e.to_string())));
        assert_eq!(parsed, Outcome::Ready(12));
    }

    #[test]
    fn test_from_result() {
        let ok: Outcome<u8> = Ok::<u8, &str>(1).into();
        assert_eq!(ok, Outcome::Ready(1));
        let err: Outcome<u8> = Err::<u8, &str>("bad").into();
        assert_eq!(err.kind(), OutcomeKind::Failed);
    }

    #[test]
    fn test_failed_equality_is_by_identity() {
        let a: Outcome<()> = Outcome::Failed(DomainError::msg("x"));
        let b: Outcome<()> = Outcome::Failed(DomainError::msg("x"));
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
    }
}
