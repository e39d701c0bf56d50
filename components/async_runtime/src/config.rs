//! Runtime configuration.
//!
//! [`RuntimeConfig`] holds the tunables of an [`EventLoop`](crate::EventLoop).
//! Every field has a default, so partial JSON documents are accepted.

use crate::error::RuntimeResult;
use serde::{Deserialize, Serialize};

/// Default bound on nested thenable adoption.
pub const DEFAULT_MAX_ADOPTION_DEPTH: usize = 1024;

/// Tunables for an event loop.
///
/// # Examples
///
/// ```
/// use async_runtime::RuntimeConfig;
///
/// let config = RuntimeConfig::from_json_str(r#"{ "microtask_budget": 10000 }"#).unwrap();
/// assert_eq!(config.microtask_budget, Some(10000));
/// assert!(config.report_unhandled_rejections);
///
/// let config = RuntimeConfig::default().with_max_adoption_depth(8);
/// assert_eq!(config.max_adoption_depth, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Maximum number of nested thenable adoptions before the resolving
    /// promise is rejected with a `RangeError`.
    pub max_adoption_depth: usize,
    /// Maximum number of microtasks executed by a single drain. `None` means
    /// unbounded.
    pub microtask_budget: Option<usize>,
    /// Whether rejections left without a handler are sent to the error sink.
    pub report_unhandled_rejections: bool,
    /// Whether panics escaping a job are caught and reported as job errors.
    pub catch_panics: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_adoption_depth: DEFAULT_MAX_ADOPTION_DEPTH,
            microtask_budget: None,
            report_unhandled_rejections: true,
            catch_panics: true,
        }
    }
}

impl RuntimeConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> RuntimeResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the maximum thenable adoption depth.
    pub fn with_max_adoption_depth(mut self, depth: usize) -> Self {
        self.max_adoption_depth = depth;
        self
    }

    /// Sets the per-drain microtask budget.
    pub fn with_microtask_budget(mut self, budget: Option<usize>) -> Self {
        self.microtask_budget = budget;
        self
    }

    /// Enables or disables unhandled-rejection reporting.
    pub fn with_unhandled_rejection_reports(mut self, enabled: bool) -> Self {
        self.report_unhandled_rejections = enabled;
        self
    }

    /// Enables or disables panic isolation at the job boundary.
    pub fn with_catch_panics(mut self, enabled: bool) -> Self {
        self.catch_panics = enabled;
        self
    }
}
