//! The reaction-registration capability.
//!
//! A value is adopted by a resolving promise only if it carries this
//! capability explicitly, through [`Value::Thenable`](crate::Value::Thenable).
//! Nothing is inferred from the shape of a value.

use crate::{Completion, Value};
use std::any::Any;
use std::rc::Rc;

/// One-shot continuation handed to [`Thenable::subscribe`].
pub type SettleFn = Box<dyn FnOnce(Value)>;

/// A value that can report its eventual outcome to a pair of continuations.
///
/// Implementors should call at most one of the two continuations, at most
/// once. Callers must not rely on that: the resolving side ignores every call
/// after the first.
///
/// # Examples
///
/// ```
/// use core_types::{Completion, SettleFn, Thenable, Value};
/// use std::any::Any;
/// use std::rc::Rc;
///
/// struct Ready(Value);
///
/// impl Thenable for Ready {
///     fn subscribe(&self, on_fulfilled: SettleFn, _on_rejected: SettleFn) -> Completion<()> {
///         on_fulfilled(self.0.clone());
///         Ok(())
///     }
///
///     fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
///         self
///     }
/// }
///
/// let value = Value::Thenable(Rc::new(Ready(Value::Smi(1))));
/// assert!(value.as_thenable().is_some());
/// ```
pub trait Thenable {
    /// Registers the continuations.
    ///
    /// Returning `Err` is equivalent to throwing from the registration call;
    /// the adopting promise rejects with the thrown value unless one of the
    /// continuations already ran.
    fn subscribe(&self, on_fulfilled: SettleFn, on_rejected: SettleFn) -> Completion<()>;

    /// Gives access to the concrete type behind a shared handle.
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}
