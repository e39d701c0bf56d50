//! Promise implementation.
//!
//! A [`Promise`] is a settle-once state machine bound to an
//! [`EventLoop`]. Reactions registered with [`Promise::then`] and friends
//! always run as microtasks, even when the promise is already settled.
//!
//! Resolution goes through a [`Resolver`], which carries the
//! "already resolved" flag: the first call to `resolve` or `reject` wins and
//! every later call is ignored. Resolving with a value that carries the
//! [`Thenable`] capability adopts that value's eventual state instead of
//! storing it. Each adoption step is a separate microtask, so nested
//! thenables unwind iteratively through the drain loop; the nesting is bounded
//! by [`RuntimeConfig::max_adoption_depth`](crate::RuntimeConfig).

use crate::event_loop::EventLoop;
use crate::task_queue::{run_guarded, MicroTask};
use core_types::{Completion, JsError, SettleFn, Thenable, Value};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::{trace, warn};

/// Identity of a promise, unique within its event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseId(pub u64);

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Promise({})", self.0)
    }
}

/// The state of a Promise.
///
/// Once settled (Fulfilled or Rejected), a Promise cannot change state.
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    /// Neither fulfilled nor rejected yet.
    Pending,
    /// Fulfilled with a value.
    Fulfilled(Value),
    /// Rejected with a reason.
    Rejected(Value),
}

impl PromiseState {
    /// Returns true while the promise is pending.
    pub fn is_pending(&self) -> bool {
        matches!(self, PromiseState::Pending)
    }

    /// Returns true once the promise is fulfilled or rejected.
    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// Returns true if the promise is fulfilled.
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, PromiseState::Fulfilled(_))
    }

    /// Returns true if the promise is rejected.
    pub fn is_rejected(&self) -> bool {
        matches!(self, PromiseState::Rejected(_))
    }

    /// Converts a settled state into a completion. `None` while pending.
    pub fn into_completion(self) -> Option<Completion> {
        match self {
            PromiseState::Pending => None,
            PromiseState::Fulfilled(value) => Some(Ok(value)),
            PromiseState::Rejected(reason) => Some(Err(reason)),
        }
    }
}

impl fmt::Display for PromiseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromiseState::Pending => write!(f, "pending"),
            PromiseState::Fulfilled(_) => write!(f, "fulfilled"),
            PromiseState::Rejected(_) => write!(f, "rejected"),
        }
    }
}

/// A reaction handler: receives the settled value (or reason) and returns
/// the completion that settles the downstream promise.
pub type Handler = Box<dyn FnOnce(Value) -> Completion>;

/// A reaction to be triggered when a Promise settles.
///
/// Omitted handlers pass the incoming outcome through unchanged. Reactions
/// registered internally (adoption, combinators) have no downstream promise.
pub(crate) struct PromiseReaction {
    on_fulfilled: Option<Handler>,
    on_rejected: Option<Handler>,
    downstream: Option<Resolver>,
}

impl PromiseReaction {
    /// Reaction that only observes the outcome.
    fn observer(on_fulfilled: SettleFn, on_rejected: SettleFn) -> Self {
        Self {
            on_fulfilled: Some(Box::new(move |value| {
                on_fulfilled(value);
                Ok(Value::Undefined)
            })),
            on_rejected: Some(Box::new(move |reason| {
                on_rejected(reason);
                Ok(Value::Undefined)
            })),
            downstream: None,
        }
    }

    /// Runs the matching handler and settles the derived promise with its
    /// result. A handler that panics rejects the derived promise; with no
    /// derived promise the failure is returned to the loop instead.
    fn trigger(self, outcome: Completion, catch_panics: bool) -> Completion<()> {
        let PromiseReaction {
            on_fulfilled,
            on_rejected,
            downstream,
        } = self;
        let result = run_guarded(catch_panics, move || match outcome {
            Ok(value) => match on_fulfilled {
                Some(handler) => handler(value),
                None => Ok(value),
            },
            Err(reason) => match on_rejected {
                Some(handler) => handler(reason),
                None => Err(reason),
            },
        });
        match downstream {
            Some(downstream) => {
                match result {
                    Ok(value) => downstream.resolve(value),
                    Err(reason) => downstream.reject(reason),
                }
                Ok(())
            }
            None => result.map(|_| ()),
        }
    }
}

impl fmt::Debug for PromiseReaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseReaction")
            .field("on_fulfilled", &self.on_fulfilled.is_some())
            .field("on_rejected", &self.on_rejected.is_some())
            .field("downstream", &self.downstream.as_ref().map(|d| d.promise.id()))
            .finish()
    }
}

struct PromiseCell {
    id: PromiseId,
    event_loop: EventLoop,
    state: RefCell<PromiseState>,
    reactions: RefCell<Vec<PromiseReaction>>,
    handled: Rc<Cell<bool>>,
}

impl PromiseCell {
    /// Stores a reaction, or schedules it right away if already settled.
    fn register(&self, reaction: PromiseReaction) {
        let was_handled = self.handled.replace(true);
        let state = self.state.borrow().clone();
        match state {
            PromiseState::Pending => self.reactions.borrow_mut().push(reaction),
            PromiseState::Fulfilled(value) => self.schedule(reaction, Ok(value)),
            PromiseState::Rejected(reason) => {
                if !was_handled {
                    self.event_loop.rejection_handled(self.id);
                }
                self.schedule(reaction, Err(reason));
            }
        }
    }

    /// Transitions out of Pending. No-op if already settled.
    fn settle(&self, outcome: Completion) {
        let reactions = {
            let mut state = self.state.borrow_mut();
            if state.is_settled() {
                return;
            }
            *state = match &outcome {
                Ok(value) => PromiseState::Fulfilled(value.clone()),
                Err(reason) => PromiseState::Rejected(reason.clone()),
            };
            std::mem::take(&mut *self.reactions.borrow_mut())
        };
        trace!(
            promise = %self.id,
            fulfilled = outcome.is_ok(),
            reactions = reactions.len(),
            "promise settled"
        );
        if let Err(reason) = &outcome {
            if !self.handled.get() {
                self.event_loop
                    .track_rejection(self.id, reason.clone(), self.handled.clone());
            }
        }
        for reaction in reactions {
            self.schedule(reaction, outcome.clone());
        }
    }

    fn schedule(&self, reaction: PromiseReaction, outcome: Completion) {
        let catch_panics = self.event_loop.config().catch_panics;
        self.event_loop
            .enqueue_microtask(MicroTask::named("promise reaction", move || {
                reaction.trigger(outcome, catch_panics)
            }));
    }
}

impl Thenable for PromiseCell {
    fn subscribe(&self, on_fulfilled: SettleFn, on_rejected: SettleFn) -> Completion<()> {
        self.register(PromiseReaction::observer(on_fulfilled, on_rejected));
        Ok(())
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

/// A promise bound to an event loop.
///
/// `Promise` is a cheap handle: clones refer to the same state machine.
///
/// # Examples
///
/// ```
/// use async_runtime::{EventLoop, PromiseState};
/// use core_types::Value;
///
/// let event_loop = EventLoop::new();
/// let deferred = event_loop.create_deferred();
/// let doubled = deferred.promise.then(|v| match v {
///     Value::Smi(n) => Ok(Value::Smi(n * 2)),
///     other => Err(other),
/// });
///
/// deferred.resolver.resolve(Value::Smi(21));
/// event_loop.run_until_idle().unwrap();
/// assert_eq!(doubled.state(), PromiseState::Fulfilled(Value::Smi(42)));
/// ```
#[derive(Clone)]
pub struct Promise {
    cell: Rc<PromiseCell>,
}

impl Promise {
    /// Creates a pending promise and runs `executor` synchronously.
    ///
    /// If the executor returns `Err`, the promise is rejected with the
    /// thrown value, unless the executor already resolved it. A panicking
    /// executor rejects with an `InternalError` when the loop catches panics.
    pub fn new<F>(event_loop: &EventLoop, executor: F) -> Promise
    where
        F: FnOnce(&Resolver) -> Completion<()>,
    {
        let (promise, resolver) = Promise::pending(event_loop);
        let catch_panics = event_loop.config().catch_panics;
        if let Err(thrown) = run_guarded(catch_panics, || executor(&resolver)) {
            resolver.reject(thrown);
        }
        promise
    }

    /// Creates a pending promise and its resolver.
    pub(crate) fn pending(event_loop: &EventLoop) -> (Promise, Resolver) {
        let promise = Promise {
            cell: Rc::new(PromiseCell {
                id: event_loop.next_promise_id(),
                event_loop: event_loop.clone(),
                state: RefCell::new(PromiseState::Pending),
                reactions: RefCell::new(Vec::new()),
                handled: Rc::new(Cell::new(false)),
            }),
        };
        let resolver = Resolver::new(promise.clone(), 0);
        (promise, resolver)
    }

    /// Creates a promise resolved with `value`.
    ///
    /// A thenable `value` is adopted, so the result may still be pending.
    pub fn resolved(event_loop: &EventLoop, value: Value) -> Promise {
        let (promise, resolver) = Promise::pending(event_loop);
        resolver.resolve(value);
        promise
    }

    /// Creates a promise rejected with `reason`.
    pub fn rejected(event_loop: &EventLoop, reason: Value) -> Promise {
        let (promise, resolver) = Promise::pending(event_loop);
        resolver.reject(reason);
        promise
    }

    /// Recovers the promise behind a [`Value::Thenable`], if it is one of ours.
    pub fn from_value(value: &Value) -> Option<Promise> {
        let thenable = value.as_thenable()?.clone();
        thenable
            .into_any()
            .downcast::<PromiseCell>()
            .ok()
            .map(|cell| Promise { cell })
    }

    /// Identity of this promise.
    pub fn id(&self) -> PromiseId {
        self.cell.id
    }

    /// The event loop this promise schedules its reactions on.
    pub fn event_loop(&self) -> &EventLoop {
        &self.cell.event_loop
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> PromiseState {
        self.cell.state.borrow().clone()
    }

    /// Returns true while the promise is pending.
    pub fn is_pending(&self) -> bool {
        self.cell.state.borrow().is_pending()
    }

    /// Returns true once any reaction has been registered.
    pub fn is_handled(&self) -> bool {
        self.cell.handled.get()
    }

    /// Number of reactions waiting for settlement.
    pub fn pending_reactions(&self) -> usize {
        self.cell.reactions.borrow().len()
    }

    /// Registers a reaction and returns the downstream promise.
    ///
    /// The matching handler runs as a microtask once this promise settles
    /// (or right after the current job, if it already has). Its completion
    /// settles the downstream promise: `Ok` resolves it (adopting thenables),
    /// `Err` rejects it. An omitted handler passes the outcome through.
    pub fn add_reaction(
        &self,
        on_fulfilled: Option<Handler>,
        on_rejected: Option<Handler>,
    ) -> Promise {
        let (downstream, resolver) = Promise::pending(&self.cell.event_loop);
        self.cell.register(PromiseReaction {
            on_fulfilled,
            on_rejected,
            downstream: Some(resolver),
        });
        downstream
    }

    /// Registers a fulfillment handler.
    pub fn then<F>(&self, on_fulfilled: F) -> Promise
    where
        F: FnOnce(Value) -> Completion + 'static,
    {
        self.add_reaction(Some(Box::new(on_fulfilled)), None)
    }

    /// Registers both a fulfillment and a rejection handler.
    pub fn then_both<F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise
    where
        F: FnOnce(Value) -> Completion + 'static,
        R: FnOnce(Value) -> Completion + 'static,
    {
        self.add_reaction(Some(Box::new(on_fulfilled)), Some(Box::new(on_rejected)))
    }

    /// Registers a rejection handler.
    pub fn catch<R>(&self, on_rejected: R) -> Promise
    where
        R: FnOnce(Value) -> Completion + 'static,
    {
        self.add_reaction(None, Some(Box::new(on_rejected)))
    }

    /// Runs `on_finally` once this promise settles, then passes the original
    /// outcome through.
    ///
    /// If `on_finally` throws, the downstream promise rejects with that
    /// value instead. If it returns a thenable, the pass-through waits for it
    /// and a rejection of that thenable wins over the original outcome.
    pub fn finally<F>(&self, on_finally: F) -> Promise
    where
        F: FnOnce() -> Completion + 'static,
    {
        let slot = Rc::new(RefCell::new(Some(on_finally)));
        let reject_slot = slot.clone();
        let event_loop = self.cell.event_loop.clone();
        let reject_loop = event_loop.clone();

        self.then_both(
            move |value| {
                let Some(callback) = slot.borrow_mut().take() else {
                    return Ok(value);
                };
                let settled = event_loop.promise_resolve(callback()?);
                Ok(settled.then(move |_| Ok(value)).into())
            },
            move |reason| {
                let Some(callback) = reject_slot.borrow_mut().take() else {
                    return Err(reason);
                };
                let settled = reject_loop.promise_resolve(callback()?);
                Ok(settled.then(move |_| Err(reason)).into())
            },
        )
    }

    /// Observes the outcome without creating a downstream promise.
    pub(crate) fn subscribe<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(Value) + 'static,
        R: FnOnce(Value) + 'static,
    {
        self.cell.register(PromiseReaction::observer(
            Box::new(on_fulfilled),
            Box::new(on_rejected),
        ));
    }

    /// Resolution procedure shared by every resolver of this promise.
    fn resolve_with(&self, value: Value, depth: usize) {
        let Some(thenable) = value.as_thenable().cloned() else {
            self.cell.settle(Ok(value));
            return;
        };

        if Rc::as_ptr(&thenable) as *const u8 == Rc::as_ptr(&self.cell) as *const u8 {
            self.cell.settle(Err(
                JsError::type_error("Chaining cycle detected for promise").into()
            ));
            return;
        }

        let limit = self.cell.event_loop.config().max_adoption_depth;
        if depth >= limit {
            warn!(promise = %self.id(), limit, "thenable adoption depth exceeded");
            self.cell.settle(Err(JsError::range_error(format!(
                "thenable adoption nested deeper than {} levels",
                limit
            ))
            .into()));
            return;
        }

        let adopter = Resolver::new(self.clone(), depth + 1);
        self.cell
            .event_loop
            .enqueue_microtask(MicroTask::named("thenable adoption", move || {
                let on_fulfilled = adopter.clone();
                let on_rejected = adopter.clone();
                let subscribed = thenable.subscribe(
                    Box::new(move |value| on_fulfilled.resolve(value)),
                    Box::new(move |reason| on_rejected.reject(reason)),
                );
                if let Err(thrown) = subscribed {
                    adopter.reject(thrown);
                }
                Ok(())
            }));
    }
}

impl PartialEq for Promise {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.cell.id)
            .field("state", &*self.cell.state.borrow())
            .field("reactions", &self.cell.reactions.borrow().len())
            .finish()
    }
}

impl From<Promise> for Value {
    fn from(promise: Promise) -> Self {
        Value::Thenable(promise.cell)
    }
}

/// The resolve/reject pair of a promise.
///
/// Clones share the "already resolved" flag, so across all of them only the
/// first `resolve` or `reject` has an effect. Resolving with a thenable locks
/// the promise in even though it stays pending until the thenable settles.
#[derive(Clone)]
pub struct Resolver {
    promise: Promise,
    already_resolved: Rc<Cell<bool>>,
    depth: usize,
}

impl Resolver {
    fn new(promise: Promise, depth: usize) -> Self {
        Self {
            promise,
            already_resolved: Rc::new(Cell::new(false)),
            depth,
        }
    }

    /// Resolves the promise, adopting `value` if it is a thenable.
    pub fn resolve(&self, value: Value) {
        if self.already_resolved.replace(true) {
            return;
        }
        self.promise.resolve_with(value, self.depth);
    }

    /// Rejects the promise with `reason`.
    pub fn reject(&self, reason: Value) {
        if self.already_resolved.replace(true) {
            return;
        }
        self.promise.cell.settle(Err(reason));
    }

    /// Returns true once `resolve` or `reject` has been called.
    pub fn is_resolved(&self) -> bool {
        self.already_resolved.get()
    }

    /// The promise this resolver settles.
    pub fn promise(&self) -> &Promise {
        &self.promise
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("promise", &self.promise.id())
            .field("already_resolved", &self.already_resolved.get())
            .field("depth", &self.depth)
            .finish()
    }
}

/// A pending promise together with its resolver.
#[derive(Debug, Clone)]
pub struct Deferred {
    /// The promise
    pub promise: Promise,
    /// Settles `promise`
    pub resolver: Resolver,
}

impl Deferred {
    /// Creates a pending promise on `event_loop`.
    pub fn new(event_loop: &EventLoop) -> Self {
        let (promise, resolver) = Promise::pending(event_loop);
        Self { promise, resolver }
    }
}
