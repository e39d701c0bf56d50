//! Promise combinators.
//!
//! Each combinator coerces its inputs with [`EventLoop::promise_resolve`],
//! observes every input in input order and settles one result promise. They
//! never cancel their inputs: once the result has settled, later input
//! settlements are simply ignored.
//!
//! When several inputs settle during the same drain, the one whose reaction
//! runs first wins. Reactions run in the order the inputs settled, and
//! inputs that were already settled when the combinator was called react in
//! input order.

use crate::event_loop::EventLoop;
use crate::promise::{Promise, Resolver};
use core_types::{JsError, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Per-call bookkeeping shared by the input observers.
#[derive(Debug)]
struct CombinatorState {
    slots: Vec<Option<Value>>,
    remaining: usize,
    settled: bool,
}

impl CombinatorState {
    fn new(len: usize) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            slots: vec![None; len],
            remaining: len,
            settled: false,
        }))
    }

    /// Stores `value` at `index` and returns every slot once all are filled.
    fn fill(&mut self, index: usize, value: Value) -> Option<Vec<Value>> {
        if self.settled {
            return None;
        }
        self.slots[index] = Some(value);
        self.remaining -= 1;
        if self.remaining > 0 {
            return None;
        }
        self.settled = true;
        Some(
            self.slots
                .drain(..)
                .map(|slot| slot.unwrap_or(Value::Undefined))
                .collect(),
        )
    }

    /// Marks the combinator as settled. Returns false if it already was.
    fn short_circuit(&mut self) -> bool {
        !std::mem::replace(&mut self.settled, true)
    }
}

fn coerce_all<I>(event_loop: &EventLoop, inputs: I) -> Vec<Promise>
where
    I: IntoIterator,
    I::Item: Into<Value>,
{
    inputs
        .into_iter()
        .map(|input| event_loop.promise_resolve(input.into()))
        .collect()
}

/// Fulfills with every input's value, in input order, once all inputs have
/// fulfilled. Rejects with the first rejection reason.
///
/// An empty input fulfills immediately with an empty array.
///
/// # Examples
///
/// ```
/// use async_runtime::{join_all, EventLoop, PromiseState};
/// use core_types::Value;
///
/// let event_loop = EventLoop::new();
/// let first = event_loop.create_deferred();
/// let all = join_all(&event_loop, vec![Value::from(first.promise.clone()), Value::Smi(2)]);
///
/// first.resolver.resolve(Value::Smi(1));
/// event_loop.run_until_idle().unwrap();
/// assert_eq!(
///     all.state(),
///     PromiseState::Fulfilled(Value::Array(vec![Value::Smi(1), Value::Smi(2)]))
/// );
/// ```
pub fn join_all<I>(event_loop: &EventLoop, inputs: I) -> Promise
where
    I: IntoIterator,
    I::Item: Into<Value>,
{
    let inputs = coerce_all(event_loop, inputs);
    let (result, resolver) = Promise::pending(event_loop);
    if inputs.is_empty() {
        resolver.resolve(Value::Array(Vec::new()));
        return result;
    }

    let state = CombinatorState::new(inputs.len());
    for (index, input) in inputs.iter().enumerate() {
        let on_value = (state.clone(), resolver.clone());
        let on_reason = (state.clone(), resolver.clone());
        input.subscribe(
            move |value| {
                let (state, resolver) = on_value;
                let values = state.borrow_mut().fill(index, value);
                if let Some(values) = values {
                    resolver.resolve(Value::Array(values));
                }
            },
            move |reason| {
                let (state, resolver) = on_reason;
                let first = state.borrow_mut().short_circuit();
                if first {
                    resolver.reject(reason);
                }
            },
        );
    }
    result
}

/// Settles like whichever input settles first.
///
/// An empty input never settles.
pub fn race<I>(event_loop: &EventLoop, inputs: I) -> Promise
where
    I: IntoIterator,
    I::Item: Into<Value>,
{
    let inputs = coerce_all(event_loop, inputs);
    let (result, resolver) = Promise::pending(event_loop);
    // The shared already-resolved flag keeps only the first outcome.
    for input in &inputs {
        let on_value = resolver.clone();
        let on_reason = resolver.clone();
        input.subscribe(
            move |value| on_value.resolve(value),
            move |reason| on_reason.reject(reason),
        );
    }
    result
}

/// Fulfills with one outcome record per input, in input order, once every
/// input has settled. Never rejects.
///
/// Records are objects of the form `{status: "fulfilled", value}` or
/// `{status: "rejected", reason}`; see [`SettledOutcome`].
pub fn all_settled<I>(event_loop: &EventLoop, inputs: I) -> Promise
where
    I: IntoIterator,
    I::Item: Into<Value>,
{
    let inputs = coerce_all(event_loop, inputs);
    let (result, resolver) = Promise::pending(event_loop);
    if inputs.is_empty() {
        resolver.resolve(Value::Array(Vec::new()));
        return result;
    }

    let state = CombinatorState::new(inputs.len());
    for (index, input) in inputs.iter().enumerate() {
        let record = move |state: Rc<RefCell<CombinatorState>>,
                           resolver: Resolver,
                           outcome: SettledOutcome| {
            let records = state.borrow_mut().fill(index, outcome.to_value());
            if let Some(records) = records {
                resolver.resolve(Value::Array(records));
            }
        };
        let on_value = (state.clone(), resolver.clone());
        let on_reason = (state.clone(), resolver.clone());
        input.subscribe(
            move |value| record(on_value.0, on_value.1, SettledOutcome::Fulfilled(value)),
            move |reason| record(on_reason.0, on_reason.1, SettledOutcome::Rejected(reason)),
        );
    }
    result
}

/// Fulfills with the first fulfillment value. If every input rejects,
/// rejects with an `AggregateError` carrying the reasons in input order.
///
/// An empty input rejects immediately with an empty aggregate.
pub fn any<I>(event_loop: &EventLoop, inputs: I) -> Promise
where
    I: IntoIterator,
    I::Item: Into<Value>,
{
    let inputs = coerce_all(event_loop, inputs);
    let (result, resolver) = Promise::pending(event_loop);
    if inputs.is_empty() {
        resolver.reject(JsError::aggregate(Vec::new()).into());
        return result;
    }

    let state = CombinatorState::new(inputs.len());
    for (index, input) in inputs.iter().enumerate() {
        let on_value = (state.clone(), resolver.clone());
        let on_reason = (state.clone(), resolver.clone());
        input.subscribe(
            move |value| {
                let (state, resolver) = on_value;
                let first = state.borrow_mut().short_circuit();
                if first {
                    resolver.resolve(value);
                }
            },
            move |reason| {
                let (state, resolver) = on_reason;
                let reasons = state.borrow_mut().fill(index, reason);
                if let Some(reasons) = reasons {
                    resolver.reject(JsError::aggregate(reasons).into());
                }
            },
        );
    }
    result
}

/// Typed view of an [`all_settled`] record.
#[derive(Debug, Clone, PartialEq)]
pub enum SettledOutcome {
    /// The input fulfilled with this value
    Fulfilled(Value),
    /// The input rejected with this reason
    Rejected(Value),
}

impl SettledOutcome {
    /// Renders the record as `{status, value}` or `{status, reason}`.
    pub fn to_value(&self) -> Value {
        match self {
            SettledOutcome::Fulfilled(value) => Value::object([
                ("status", Value::from("fulfilled")),
                ("value", value.clone()),
            ]),
            SettledOutcome::Rejected(reason) => Value::object([
                ("status", Value::from("rejected")),
                ("reason", reason.clone()),
            ]),
        }
    }

    /// Parses a record produced by [`SettledOutcome::to_value`].
    pub fn from_value(record: &Value) -> Option<SettledOutcome> {
        match record.get("status")? {
            Value::String(status) if status == "fulfilled" => {
                Some(SettledOutcome::Fulfilled(record.get("value")?.clone()))
            }
            Value::String(status) if status == "rejected" => {
                Some(SettledOutcome::Rejected(record.get("reason")?.clone()))
            }
            _ => None,
        }
    }
}
