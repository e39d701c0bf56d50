//! Core value types shared by the runtime components.
//!
//! This crate provides the foundational types the event loop and the
//! promise machinery exchange: values, rejection reasons and the capability
//! used to recognise adoptable (thenable) values.
//!
//! # Overview
//!
//! - [`Value`] - Tagged representation of runtime values
//! - [`JsError`] - Engine-raised errors carried as rejection reasons
//! - [`ErrorKind`] - Types of engine errors
//! - [`Thenable`] - Explicit reaction-registration capability
//! - [`Completion`] - Result of any user callback; `Err` carries a thrown value
//!
//! # Examples
//!
//! ```
//! use core_types::{Completion, ErrorKind, JsError, Value};
//!
//! let num = Value::Smi(42);
//! assert_eq!(num.to_string(), "42");
//!
//! let error = JsError::type_error("undefined is not a function");
//! assert_eq!(error.kind, ErrorKind::TypeError);
//!
//! let thrown: Completion = Err(error.into());
//! assert!(thrown.is_err());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod thenable;
mod value;

pub use error::{ErrorKind, JsError};
pub use thenable::{SettleFn, Thenable};
pub use value::Value;

/// Outcome of a user callback.
///
/// `Ok` is a normal return; `Err` carries the thrown value.
pub type Completion<T = Value> = Result<T, Value>;
