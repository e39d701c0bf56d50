//! Event loop errors.
//!
//! These describe misuse of the loop itself. Failures inside jobs never
//! surface here: they are reported to the [`ErrorSink`](crate::ErrorSink).

/// Errors returned by the event loop's drain and run operations.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A drain or run operation was called from inside a running job.
    #[error("event loop re-entered from inside a running job")]
    Reentrant,

    /// A single drain executed more microtasks than the configured budget.
    #[error("microtask budget of {budget} exhausted in a single drain")]
    MicrotaskBudgetExhausted {
        /// The configured budget
        budget: usize,
    },

    /// The configuration document could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type for event loop operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;
