//! Error reporting.
//!
//! Job failures and unhandled rejections never propagate into caller code.
//! The event loop hands them to an injected [`ErrorSink`] instead.

use crate::promise::PromiseId;
use crate::task_queue::JobId;
use core_types::Value;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{error, info, warn};

/// Receives failures isolated by the event loop.
pub trait ErrorSink {
    /// A job returned `Err` (or panicked).
    fn job_error(&self, job: JobId, name: Option<&str>, error: &Value);

    /// A promise was still rejected without a handler at a microtask
    /// checkpoint.
    fn unhandled_rejection(&self, promise: PromiseId, reason: &Value);

    /// A handler was attached to a rejection previously reported as
    /// unhandled.
    fn rejection_handled(&self, _promise: PromiseId) {}
}

/// Sink that writes every report to `tracing`.
///
/// This is the sink a loop gets when none is injected.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn job_error(&self, job: JobId, name: Option<&str>, error: &Value) {
        error!(%job, job_name = name.unwrap_or("<anonymous>"), %error, "uncaught error in job");
    }

    fn unhandled_rejection(&self, promise: PromiseId, reason: &Value) {
        warn!(%promise, %reason, "unhandled promise rejection");
    }

    fn rejection_handled(&self, promise: PromiseId) {
        info!(%promise, "rejection handled after being reported");
    }
}

/// One report received by a [`CollectingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorReport {
    /// See [`ErrorSink::job_error`]
    JobError {
        /// Failing job
        job: JobId,
        /// Diagnostic name of the job, if any
        name: Option<String>,
        /// The thrown value
        error: Value,
    },
    /// See [`ErrorSink::unhandled_rejection`]
    UnhandledRejection {
        /// Rejected promise
        promise: PromiseId,
        /// Rejection reason
        reason: Value,
    },
    /// See [`ErrorSink::rejection_handled`]
    RejectionHandled {
        /// Promise that gained a handler
        promise: PromiseId,
    },
}

/// Sink that keeps every report in memory.
///
/// Clones share the same buffer, so a test can keep one clone and give the
/// other to the loop.
///
/// # Examples
///
/// ```
/// use async_runtime::{CollectingSink, EventLoop, MicroTask};
/// use core_types::Value;
///
/// let sink = CollectingSink::new();
/// let event_loop = EventLoop::builder().sink(sink.clone()).build();
/// event_loop.enqueue_microtask(MicroTask::new(|| Err(Value::from("boom"))));
/// event_loop.run_until_idle().unwrap();
/// assert_eq!(sink.job_errors(), vec![Value::from("boom")]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    reports: Rc<RefCell<Vec<ErrorReport>>>,
}

impl CollectingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All reports received so far, oldest first.
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.borrow().clone()
    }

    /// Removes and returns all reports received so far.
    pub fn take(&self) -> Vec<ErrorReport> {
        std::mem::take(&mut *self.reports.borrow_mut())
    }

    /// Number of reports received.
    pub fn len(&self) -> usize {
        self.reports.borrow().len()
    }

    /// Returns true if nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.reports.borrow().is_empty()
    }

    /// Errors thrown by jobs, in report order.
    pub fn job_errors(&self) -> Vec<Value> {
        self.reports
            .borrow()
            .iter()
            .filter_map(|report| match report {
                ErrorReport::JobError { error, .. } => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    /// Unhandled rejections, in report order.
    pub fn unhandled_rejections(&self) -> Vec<(PromiseId, Value)> {
        self.reports
            .borrow()
            .iter()
            .filter_map(|report| match report {
                ErrorReport::UnhandledRejection { promise, reason } => {
                    Some((*promise, reason.clone()))
                }
                _ => None,
            })
            .collect()
    }

    fn push(&self, report: ErrorReport) {
        self.reports.borrow_mut().push(report);
    }
}

impl ErrorSink for CollectingSink {
    fn job_error(&self, job: JobId, name: Option<&str>, error: &Value) {
        self.push(ErrorReport::JobError {
            job,
            name: name.map(str::to_string),
            error: error.clone(),
        });
    }

    fn unhandled_rejection(&self, promise: PromiseId, reason: &Value) {
        self.push(ErrorReport::UnhandledRejection {
            promise,
            reason: reason.clone(),
        });
    }

    fn rejection_handled(&self, promise: PromiseId) {
        self.push(ErrorReport::RejectionHandled { promise });
    }
}
