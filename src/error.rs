//! Error types for the acacia search engine.

use std::cell::RefCell;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AcaciaError>;

/// Errors that can occur in the search engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AcaciaError {
    /// An argument did not satisfy the operation's contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A document or other entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A document payload could not be parsed as JSON.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// A query could not be parsed or executed.
    #[error("query error: {0}")]
    Query(String),

    /// A predicate expression could not be decoded or evaluated.
    #[error("expression error: {0}")]
    Expression(String),

    /// A shard-level operation failed.
    #[error("shard error: {0}")]
    Shard(String),

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AcaciaError {
    /// Create an invalid argument error.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        AcaciaError::InvalidArgument(message.into())
    }

    /// Create a not found error.
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        AcaciaError::NotFound(message.into())
    }

    /// Create a malformed document error.
    pub fn malformed_document<S: Into<String>>(message: S) -> Self {
        AcaciaError::MalformedDocument(message.into())
    }

    /// Create a query error.
    pub fn query<S: Into<String>>(message: S) -> Self {
        AcaciaError::Query(message.into())
    }

    /// Create an expression error.
    pub fn expression<S: Into<String>>(message: S) -> Self {
        AcaciaError::Expression(message.into())
    }

    /// Create a shard error.
    pub fn shard<S: Into<String>>(message: S) -> Self {
        AcaciaError::Shard(message.into())
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        AcaciaError::Internal(message.into())
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Record an error message in the calling thread's last-error slot.
///
/// The embedding facade calls this whenever an operation reports failure
/// through a null-ish return value.
pub(crate) fn set_last_error(err: &AcaciaError) {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(err.to_string()));
}

/// Return the last error recorded on the calling thread, if any.
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

/// Clear the calling thread's last-error slot.
pub fn clear_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}
