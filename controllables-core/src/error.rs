//! Error Types
//!
//! Every fallible operation in the runtime returns [`Result`], whose error
//! side is the crate-level [`Error`]. Each concern has its own enum so that
//! callers can match on exactly the conditions they care about:
//!
//! | Error | Raised by | Recoverable |
//! |-------|-----------|-------------|
//! | [`AttachError`] | attachment state machine | No |
//! | [`AckError`] | acknowledgement cells | Timeout only |
//! | [`CallbackError`] | `wait` / `await` on a callback | Timeout only |
//! | [`VariableError`] | reading or writing variables | TemporarilyUnavailable only |
//! | [`MapError`] | structural mapper | No |
//! | [`RefError`] | reference resolution | No |
//!
//! Retryable conditions are reported through [`Error::is_recoverable`]. They
//! are never logged as errors by this crate; callers are expected to poll
//! again on a later tick.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Violations of the single-owner attachment discipline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachError {
    /// The component is bound to a different parent.
    #[error("component is already attached to another parent")]
    AlreadyAttached,

    /// Detach was requested on a component that was never attached.
    #[error("component is not attached")]
    NotAttached,

    /// The parent was requested on a component that has none.
    #[error("component does not have a parent attached")]
    NoParent,

    /// Detach named a parent other than the one the component is bound to.
    #[error("component is attached to a different parent than the one given")]
    ParentMismatch,

    /// A callback was asked to relay into itself.
    #[error("a callback cannot listen to itself")]
    SelfRelay,
}

/// Failures of a deferred acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AckError {
    /// Nobody acknowledged before the deadline.
    #[error("acknowledgement timed out")]
    Timeout,

    /// The handler side cancelled the acknowledgement.
    #[error("acknowledgement was cancelled")]
    Cancelled,
}

/// Failures observed by a caller waiting on a callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// The callback did not fire before the deadline.
    #[error("timed out waiting for callback")]
    Timeout,

    /// The pending wait was cancelled.
    #[error("wait cancelled: {0}")]
    Cancelled(String),
}

/// Failures reading or writing variables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VariableError {
    /// The value does not exist yet but may appear later.
    #[error("temporarily unavailable: {0}")]
    TemporarilyUnavailable(String),

    /// A write was directed at a read-only element.
    #[error("variable is not writable")]
    NotWritable,

    /// A value of the wrong shape or kind was supplied.
    #[error("type mismatch: expected {expected}")]
    TypeMismatch { expected: String },
}

/// Failures of the structural mapper.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("no objects to map")]
    Empty,

    /// The leaf operation could not handle the shapes it was given.
    #[error("cannot map objects of shapes {0:?}")]
    ShapeMismatch(Vec<&'static str>),
}

/// Failures of reference resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefError {
    /// A symbol is not a member of the manager.
    #[error("invalid or non-existent reference: {0}")]
    Unresolved(String),

    /// The resolved value does not satisfy the requested type.
    #[error("resolved value is not a {expected}")]
    TypeMismatch { expected: &'static str },
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Attach(#[from] AttachError),

    #[error(transparent)]
    Ack(#[from] AckError),

    #[error(transparent)]
    Callback(#[from] CallbackError),

    #[error(transparent)]
    Variable(#[from] VariableError),

    #[error(transparent)]
    Map(#[from] MapError),

    #[error(transparent)]
    Ref(#[from] RefError),

    /// An optional cargo feature needed by the requested operation is off.
    #[error("missing optional dependency; rebuild with `--features {}`", .features.join(","))]
    OptionalDependencyMissing { features: Vec<String> },

    /// Configuration could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A user listener failed; the failure aborts the whole dispatch.
    #[error("listener failed: {0}")]
    Listener(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Build an [`Error::OptionalDependencyMissing`] naming the features to enable.
    pub fn suggest<I, S>(features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::OptionalDependencyMissing {
            features: features.into_iter().map(Into::into).collect(),
        }
    }

    /// Wrap an arbitrary failure raised inside a listener.
    pub fn listener<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Listener(err.into())
    }

    /// Shortcut for [`VariableError::TemporarilyUnavailable`].
    pub fn unavailable(what: impl Into<String>) -> Self {
        Self::Variable(VariableError::TemporarilyUnavailable(what.into()))
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Variable(VariableError::TemporarilyUnavailable(_))
                | Error::Ack(AckError::Timeout)
                | Error::Callback(CallbackError::Timeout)
        )
    }

    /// Whether this is the retryable "not there yet" condition.
    pub fn is_temporarily_unavailable(&self) -> bool {
        matches!(self, Error::Variable(VariableError::TemporarilyUnavailable(_)))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverability() {
        assert!(Error::unavailable("handle").is_recoverable());
        assert!(Error::from(AckError::Timeout).is_recoverable());
        assert!(Error::from(CallbackError::Timeout).is_recoverable());
        assert!(!Error::from(AttachError::AlreadyAttached).is_recoverable());
        assert!(!Error::from(AckError::Cancelled).is_recoverable());
    }

    #[test]
    fn suggestion_names_features() {
        let err = Error::suggest(["toml"]);
        assert_eq!(
            err.to_string(),
            "missing optional dependency; rebuild with `--features toml`"
        );
    }

    #[test]
    fn listener_wraps_strings() {
        let err = Error::listener("boom");
        assert_eq!(err.to_string(), "listener failed: boom");
    }
}
