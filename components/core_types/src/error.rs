//! Engine error types.
//!
//! These are the errors the runtime itself raises (as opposed to arbitrary
//! values thrown by user callbacks). They travel as rejection reasons wrapped
//! in [`Value::Error`].

use crate::Value;
use std::fmt;

/// The kind of engine error.
///
/// These correspond to the built-in error constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Type error (e.g. a promise resolved with itself)
    TypeError,
    /// Value out of allowed range (e.g. adoption depth exceeded)
    RangeError,
    /// Every input of an `any` combination rejected
    AggregateError,
    /// Internal engine error (e.g. a panicking job)
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::AggregateError => "AggregateError",
            ErrorKind::InternalError => "InternalError",
        };
        f.write_str(name)
    }
}

/// An engine error with message and, for aggregates, the wrapped reasons.
///
/// # Examples
///
/// ```
/// use core_types::{ErrorKind, JsError, Value};
///
/// let error = JsError::type_error("undefined is not a function");
/// assert_eq!(error.to_string(), "TypeError: undefined is not a function");
///
/// let aggregate = JsError::aggregate(vec![Value::from("a"), Value::from("b")]);
/// assert_eq!(aggregate.kind, ErrorKind::AggregateError);
/// assert_eq!(aggregate.errors.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct JsError {
    /// The type of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Wrapped reasons, in input order (only populated for aggregates)
    pub errors: Vec<Value>,
}

impl JsError {
    /// Creates an error of the given kind with no wrapped reasons.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    /// Creates a `TypeError`.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    /// Creates a `RangeError`.
    pub fn range_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RangeError, message)
    }

    /// Creates an `InternalError`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    /// Creates an `AggregateError` wrapping `errors` in the given order.
    pub fn aggregate(errors: Vec<Value>) -> Self {
        Self {
            kind: ErrorKind::AggregateError,
            message: "All promises were rejected".to_string(),
            errors,
        }
    }
}
