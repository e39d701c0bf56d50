//! Event loop implementation.
//!
//! This module provides the event loop that owns the task and microtask
//! queues and runs them in order. Each turn of the loop:
//! 1. Drains the microtask queue, including microtasks enqueued while draining
//! 2. Waits for the earliest task to become due and runs it
//! 3. Drains the microtask queue again
//!
//! After every drain the loop reaches a checkpoint where rejections that are
//! still unhandled get reported.

use crate::clock::{Clock, Millis, VirtualClock};
use crate::config::RuntimeConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::promise::{Deferred, Promise, PromiseId, PromiseState};
use crate::rejection::RejectionTracker;
use crate::report::{ErrorSink, TracingSink};
use crate::task_queue::{
    run_guarded, JobId, MicroTask, MicrotaskQueue, ScheduledTask, Task, TaskQueue, TimerHandle,
};
use core_types::{Completion, Value};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Counters accumulated over the lifetime of a loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    /// Microtasks executed
    pub microtasks_run: u64,
    /// Tasks executed
    pub macrotasks_run: u64,
    /// Jobs that returned `Err` or panicked
    pub job_errors: u64,
    /// Tasks cancelled before they ran
    pub cancelled: u64,
    /// Rejections reported as unhandled
    pub unhandled_rejections: u64,
    /// Jobs dropped by shutdown
    pub discarded: u64,
}

/// What a single [`EventLoop::run_once`] call did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Turn {
    /// Microtasks executed during the turn
    pub microtasks_run: usize,
    /// The task executed, if any
    pub macrotask: Option<JobId>,
    /// Whether the loop had to wait for the task's due-time
    pub clock_advanced: bool,
}

struct LoopInner {
    config: RuntimeConfig,
    clock: Rc<dyn Clock>,
    sink: Rc<dyn ErrorSink>,
    microtasks: RefCell<MicrotaskQueue>,
    tasks: RefCell<TaskQueue>,
    rejections: RefCell<RejectionTracker>,
    next_job: Cell<u64>,
    next_promise: Cell<u64>,
    running: Cell<bool>,
    shut_down: Cell<bool>,
    stats: Cell<LoopStats>,
}

/// Clears the running flag when a drain or turn ends, even by unwinding.
struct RunningGuard<'a>(&'a Cell<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// The event loop.
///
/// `EventLoop` is a cheap handle; clones drive the same queues. Jobs capture
/// a clone to enqueue more work. The loop is single-threaded: handles are
/// neither `Send` nor `Sync`, and no borrow of loop state is held while a
/// job runs.
///
/// # Examples
///
/// ```
/// use async_runtime::{EventLoop, MicroTask, Task};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let event_loop = EventLoop::new();
/// let order = Rc::new(RefCell::new(Vec::new()));
///
/// let o = order.clone();
/// event_loop.schedule_macrotask(Task::new(move || {
///     o.borrow_mut().push("task");
///     Ok(())
/// }), 0);
/// let o = order.clone();
/// event_loop.enqueue_microtask(MicroTask::new(move || {
///     o.borrow_mut().push("microtask");
///     Ok(())
/// }));
///
/// event_loop.run_until_idle().unwrap();
/// assert_eq!(*order.borrow(), vec!["microtask", "task"]);
/// ```
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

/// Configures an [`EventLoop`] before construction.
pub struct EventLoopBuilder {
    config: RuntimeConfig,
    clock: Option<Rc<dyn Clock>>,
    sink: Option<Rc<dyn ErrorSink>>,
}

impl EventLoopBuilder {
    /// Sets the configuration.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the clock. Defaults to a fresh [`VirtualClock`].
    pub fn clock<C: Clock + 'static>(mut self, clock: Rc<C>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the error sink. Defaults to [`TracingSink`].
    pub fn sink<S: ErrorSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Rc::new(sink));
        self
    }

    /// Builds the loop.
    pub fn build(self) -> EventLoop {
        EventLoop {
            inner: Rc::new(LoopInner {
                config: self.config,
                clock: self
                    .clock
                    .unwrap_or_else(|| Rc::new(VirtualClock::new())),
                sink: self.sink.unwrap_or_else(|| Rc::new(TracingSink)),
                microtasks: RefCell::new(MicrotaskQueue::new()),
                tasks: RefCell::new(TaskQueue::new()),
                rejections: RefCell::new(RejectionTracker::default()),
                next_job: Cell::new(0),
                next_promise: Cell::new(0),
                running: Cell::new(false),
                shut_down: Cell::new(false),
                stats: Cell::new(LoopStats::default()),
            }),
        }
    }
}

impl EventLoop {
    /// Creates an EventLoop with default configuration, a virtual clock and
    /// the tracing error sink.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts configuring an EventLoop.
    pub fn builder() -> EventLoopBuilder {
        EventLoopBuilder {
            config: RuntimeConfig::default(),
            clock: None,
            sink: None,
        }
    }

    /// The loop's configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// The loop's clock.
    pub fn clock(&self) -> Rc<dyn Clock> {
        self.inner.clock.clone()
    }

    /// Current time according to the loop's clock.
    pub fn now(&self) -> Millis {
        self.inner.clock.now()
    }

    /// Returns true if both handles drive the same loop.
    pub fn ptr_eq(&self, other: &EventLoop) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Adds a microtask to the microtask queue.
    ///
    /// The microtask runs after the current job and before the next task.
    /// Microtasks cannot be cancelled.
    pub fn enqueue_microtask(&self, microtask: MicroTask) {
        if self.inner.shut_down.get() {
            warn!(
                job_name = microtask.name().unwrap_or(""),
                "microtask dropped: event loop is shut down"
            );
            return;
        }
        let id = self.next_job_id();
        trace!(job = %id, "microtask enqueued");
        self.inner.microtasks.borrow_mut().enqueue(id, microtask);
    }

    /// Schedules a task `delay` milliseconds from now.
    pub fn schedule_macrotask(&self, task: Task, delay: Millis) -> TimerHandle {
        let due = self.now().saturating_add(delay);
        self.schedule_macrotask_at(task, due)
    }

    /// Schedules a task at an absolute due-time.
    ///
    /// Tasks with equal due-times run in scheduling order.
    pub fn schedule_macrotask_at(&self, task: Task, due: Millis) -> TimerHandle {
        let id = self.next_job_id();
        let handle = TimerHandle(id.0);
        if self.inner.shut_down.get() {
            warn!(%handle, "task dropped: event loop is shut down");
            return handle;
        }
        trace!(%handle, due, "task scheduled");
        self.inner.tasks.borrow_mut().insert(ScheduledTask {
            handle,
            id,
            due,
            task,
        });
        handle
    }

    /// Runs `f` once, `delay` milliseconds from now.
    pub fn set_timeout<F>(&self, delay: Millis, f: F) -> TimerHandle
    where
        F: FnOnce() -> Completion<()> + 'static,
    {
        self.schedule_macrotask(Task::named("timeout", f), delay)
    }

    /// Runs `f` every `period` milliseconds until the handle is cancelled.
    pub fn set_interval<F>(&self, period: Millis, f: F) -> TimerHandle
    where
        F: FnMut() -> Completion<()> + 'static,
    {
        self.schedule_macrotask(Task::repeating(period, f).with_name("interval"), period)
    }

    /// Cancels a task that has not started yet.
    ///
    /// Returns false if the task already ran or the handle is unknown. A
    /// repeating task cancelled from inside its own run is not queued again.
    pub fn cancel(&self, handle: TimerHandle) -> bool {
        let cancelled = self.inner.tasks.borrow_mut().cancel(handle);
        if cancelled {
            debug!(%handle, "task cancelled");
            self.record(|stats| stats.cancelled += 1);
        }
        cancelled
    }

    /// Runs microtasks until the queue is empty.
    ///
    /// Microtasks enqueued by the ones running are drained too. Returns the
    /// number of microtasks executed.
    pub fn drain_microtasks(&self) -> RuntimeResult<usize> {
        let _guard = self.enter()?;
        self.drain()
    }

    /// Processes one turn: drain microtasks, run the earliest task (waiting
    /// for its due-time), drain microtasks again.
    pub fn run_once(&self) -> RuntimeResult<Turn> {
        let _guard = self.enter()?;
        let mut turn = Turn {
            microtasks_run: self.drain()?,
            ..Turn::default()
        };

        let Some(due) = self.inner.tasks.borrow().next_due() else {
            return Ok(turn);
        };
        let now = self.inner.clock.now();
        if due > now {
            debug!(now, due, "waiting for next task");
            self.inner.clock.wait_until(due);
            turn.clock_advanced = true;
        }

        let next = self.inner.tasks.borrow_mut().dequeue();
        if let Some(scheduled) = next {
            turn.macrotask = Some(scheduled.id);
            self.run_task(scheduled);
            turn.microtasks_run += self.drain()?;
        }
        debug!(
            microtasks = turn.microtasks_run,
            task = ?turn.macrotask,
            "turn complete"
        );
        Ok(turn)
    }

    /// Runs turns until both queues are empty.
    ///
    /// With repeating tasks this only returns once they are cancelled, which
    /// makes it the main loop of a live embedding.
    pub fn run_until_idle(&self) -> RuntimeResult<LoopStats> {
        loop {
            self.run_once()?;
            if !self.has_pending_work() {
                break;
            }
        }
        Ok(self.stats())
    }

    /// Runs the loop until there is no work left.
    ///
    /// Equivalent to [`run_until_idle`](Self::run_until_idle), for callers
    /// that do not need the counters.
    pub fn run(&self) -> RuntimeResult<()> {
        self.run_until_idle().map(|_| ())
    }

    /// Runs turns until `promise` settles or the loop runs out of work.
    ///
    /// Returns the promise's state at that point, which is still
    /// [`PromiseState::Pending`] if the loop went idle first.
    pub fn run_until_settled(&self, promise: &Promise) -> RuntimeResult<PromiseState> {
        while promise.is_pending() && self.has_pending_work() {
            self.run_once()?;
        }
        Ok(promise.state())
    }

    /// Drops every queued job and refuses new ones.
    ///
    /// Calling it again has no effect.
    pub fn shutdown(&self) {
        if self.inner.shut_down.replace(true) {
            return;
        }
        let dropped = self.inner.microtasks.borrow_mut().clear()
            + self.inner.tasks.borrow_mut().clear();
        self.inner.rejections.borrow_mut().clear();
        self.record(|stats| stats.discarded += dropped as u64);
        debug!(dropped, "event loop shut down");
    }

    /// Returns true once [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.get()
    }

    /// Returns true if either queue holds a job.
    pub fn has_pending_work(&self) -> bool {
        !self.is_microtask_queue_empty() || !self.is_task_queue_empty()
    }

    /// Returns true if the task queue is empty.
    pub fn is_task_queue_empty(&self) -> bool {
        self.inner.tasks.borrow().is_empty()
    }

    /// Returns true if the microtask queue is empty.
    pub fn is_microtask_queue_empty(&self) -> bool {
        self.inner.microtasks.borrow().is_empty()
    }

    /// Number of queued tasks.
    pub fn pending_macrotasks(&self) -> usize {
        self.inner.tasks.borrow().len()
    }

    /// Due-time of the earliest queued task.
    pub fn next_due(&self) -> Option<Millis> {
        self.inner.tasks.borrow().next_due()
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> LoopStats {
        self.inner.stats.get()
    }

    /// Creates a pending promise and its resolver.
    pub fn create_deferred(&self) -> Deferred {
        Deferred::new(self)
    }

    /// Converts a value into a promise on this loop.
    ///
    /// A promise of this loop is returned as is; anything else becomes a new
    /// promise resolved with the value (adopting it if it is a thenable).
    pub fn promise_resolve(&self, value: Value) -> Promise {
        match Promise::from_value(&value) {
            Some(promise) if promise.event_loop().ptr_eq(self) => promise,
            _ => Promise::resolved(self, value),
        }
    }

    /// Creates a promise rejected with `reason`.
    pub fn promise_reject(&self, reason: Value) -> Promise {
        Promise::rejected(self, reason)
    }

    pub(crate) fn next_promise_id(&self) -> PromiseId {
        let id = self.inner.next_promise.get();
        self.inner.next_promise.set(id + 1);
        PromiseId(id)
    }

    pub(crate) fn track_rejection(&self, promise: PromiseId, reason: Value, handled: Rc<Cell<bool>>) {
        if self.inner.config.report_unhandled_rejections && !self.is_shut_down() {
            self.inner
                .rejections
                .borrow_mut()
                .track(promise, reason, handled);
        }
    }

    pub(crate) fn rejection_handled(&self, promise: PromiseId) {
        let was_reported = self.inner.rejections.borrow_mut().handled(promise);
        if was_reported {
            self.inner.sink.rejection_handled(promise);
        }
    }

    fn next_job_id(&self) -> JobId {
        let id = self.inner.next_job.get();
        self.inner.next_job.set(id + 1);
        JobId(id)
    }

    fn record(&self, update: impl FnOnce(&mut LoopStats)) {
        let mut stats = self.inner.stats.get();
        update(&mut stats);
        self.inner.stats.set(stats);
    }

    fn enter(&self) -> RuntimeResult<RunningGuard<'_>> {
        if self.inner.running.replace(true) {
            return Err(RuntimeError::Reentrant);
        }
        Ok(RunningGuard(&self.inner.running))
    }

    fn drain(&self) -> RuntimeResult<usize> {
        let budget = self.inner.config.microtask_budget;
        let mut executed = 0;
        loop {
            if let Some(budget) = budget {
                if executed >= budget && !self.is_microtask_queue_empty() {
                    warn!(budget, "microtask budget exhausted");
                    return Err(RuntimeError::MicrotaskBudgetExhausted { budget });
                }
            }
            let next = self.inner.microtasks.borrow_mut().dequeue();
            let Some((id, microtask)) = next else {
                break;
            };
            let name = microtask.label();
            self.execute(id, name.as_deref(), || microtask.run());
            self.record(|stats| stats.microtasks_run += 1);
            executed += 1;
        }
        self.checkpoint();
        Ok(executed)
    }

    fn run_task(&self, scheduled: ScheduledTask) {
        let ScheduledTask {
            handle,
            id,
            due,
            task,
        } = scheduled;
        let name = task.label();
        let mut again = None;
        self.execute(id, name.as_deref(), || {
            let (result, next) = task.run();
            again = next;
            result
        });
        self.record(|stats| stats.macrotasks_run += 1);

        let still_live = self.inner.tasks.borrow_mut().finish_running(handle);
        if let Some(task) = again {
            if still_live && !self.is_shut_down() {
                let period = task.period().unwrap_or(0);
                let id = self.next_job_id();
                self.inner.tasks.borrow_mut().insert(ScheduledTask {
                    handle,
                    id,
                    due: due.saturating_add(period),
                    task,
                });
            }
        }
    }

    /// Runs one job, isolating its failure.
    fn execute<F>(&self, id: JobId, name: Option<&str>, job: F)
    where
        F: FnOnce() -> Completion<()>,
    {
        trace!(job = %id, job_name = name.unwrap_or(""), "running job");
        let result = run_guarded(self.inner.config.catch_panics, job);
        if let Err(error) = result {
            debug!(job = %id, %error, "job failed");
            self.record(|stats| stats.job_errors += 1);
            self.inner.sink.job_error(id, name, &error);
        }
    }

    /// Reports rejections that are still unhandled.
    fn checkpoint(&self) {
        let unhandled = self.inner.rejections.borrow_mut().take_unhandled();
        for (promise, reason) in unhandled {
            self.record(|stats| stats.unhandled_rejections += 1);
            self.inner.sink.unhandled_rejection(promise, &reason);
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("now", &self.now())
            .field("microtasks", &self.inner.microtasks.borrow().len())
            .field("tasks", &self.inner.tasks.borrow().len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
