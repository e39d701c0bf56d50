//! Task and microtask queue management.
//!
//! This module provides the two queues owned by the event loop. Microtasks
//! run in strict FIFO order. Tasks (macrotasks) run in due-time order, ties
//! broken by insertion order, and can be cancelled until they start.

use crate::clock::Millis;
use core_types::{Completion, JsError};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Identity of a queued job.
///
/// Ids are handed out by the event loop in enqueue order, so they double as
/// the insertion sequence number used for tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// Cancellable handle to a scheduled task.
///
/// A repeating task keeps the same handle across all of its runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub(crate) u64);

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

enum TaskBody {
    Once(Box<dyn FnOnce() -> Completion<()>>),
    Repeating {
        callback: Box<dyn FnMut() -> Completion<()>>,
        period: Millis,
    },
}

/// A task to be executed by the event loop.
///
/// Tasks represent coarse-grained work such as timer callbacks. Exactly one
/// task runs per loop turn, and all microtasks drain around it.
pub struct Task {
    name: Option<Cow<'static, str>>,
    body: TaskBody,
}

impl Task {
    /// Creates a new Task from a closure.
    ///
    /// # Arguments
    ///
    /// * `f` - The function to execute when the task runs
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> Completion<()> + 'static,
    {
        Self {
            name: None,
            body: TaskBody::Once(Box::new(f)),
        }
    }

    /// Creates a named Task. The name appears in error reports and traces.
    pub fn named<F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: FnOnce() -> Completion<()> + 'static,
    {
        Self::new(f).with_name(name)
    }

    /// Creates a Task that is re-queued `period` milliseconds after each
    /// run until its handle is cancelled.
    pub fn repeating<F>(period: Millis, f: F) -> Self
    where
        F: FnMut() -> Completion<()> + 'static,
    {
        Self {
            name: None,
            body: TaskBody::Repeating {
                callback: Box::new(f),
                period,
            },
        }
    }

    /// Sets the diagnostic name.
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Diagnostic name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn label(&self) -> Option<Cow<'static, str>> {
        self.name.clone()
    }

    /// Repeat period, if this is a repeating task.
    pub fn period(&self) -> Option<Millis> {
        match self.body {
            TaskBody::Once(_) => None,
            TaskBody::Repeating { period, .. } => Some(period),
        }
    }

    /// Executes the task.
    ///
    /// A repeating task hands itself back so it can be queued again.
    pub fn run(self) -> (Completion<()>, Option<Task>) {
        match self.body {
            TaskBody::Once(callback) => (callback(), None),
            TaskBody::Repeating {
                mut callback,
                period,
            } => {
                let result = callback();
                let again = Task {
                    name: self.name,
                    body: TaskBody::Repeating { callback, period },
                };
                (result, Some(again))
            }
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("period", &self.period())
            .finish_non_exhaustive()
    }
}

/// A microtask to be executed by the event loop.
///
/// Microtasks run after the current job and before the next task. Promise
/// reactions are microtasks.
pub struct MicroTask {
    name: Option<Cow<'static, str>>,
    callback: Box<dyn FnOnce() -> Completion<()>>,
}

impl MicroTask {
    /// Creates a new MicroTask from a closure.
    ///
    /// # Arguments
    ///
    /// * `f` - The function to execute when the microtask runs
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> Completion<()> + 'static,
    {
        Self {
            name: None,
            callback: Box::new(f),
        }
    }

    /// Creates a named MicroTask.
    pub fn named<F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: FnOnce() -> Completion<()> + 'static,
    {
        Self {
            name: Some(name.into()),
            callback: Box::new(f),
        }
    }

    /// Diagnostic name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn label(&self) -> Option<Cow<'static, str>> {
        self.name.clone()
    }

    /// Executes the microtask.
    ///
    /// # Returns
    ///
    /// `Err` carries the value thrown by the microtask.
    pub fn run(self) -> Completion<()> {
        (self.callback)()
    }
}

impl fmt::Debug for MicroTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicroTask")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A task waiting in the [`TaskQueue`].
#[derive(Debug)]
pub struct ScheduledTask {
    /// Handle the task was scheduled under
    pub handle: TimerHandle,
    /// Job identity of this run
    pub id: JobId,
    /// When the task becomes runnable
    pub due: Millis,
    /// The task itself
    pub task: Task,
}

/// A queue for tasks, ordered by `(due, id)`.
///
/// Cancellation is by handle. A repeating task that is currently running is
/// not in the queue; cancelling it only stops it from being queued again.
#[derive(Debug, Default)]
pub struct TaskQueue {
    entries: BTreeMap<(Millis, JobId), ScheduledTask>,
    index: HashMap<TimerHandle, (Millis, JobId)>,
    running: HashSet<TimerHandle>,
}

impl TaskQueue {
    /// Creates a new empty TaskQueue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a task. `id` must be greater than every id inserted before.
    pub fn insert(&mut self, scheduled: ScheduledTask) {
        let key = (scheduled.due, scheduled.id);
        self.index.insert(scheduled.handle, key);
        self.entries.insert(key, scheduled);
    }

    /// Due-time of the earliest task.
    pub fn next_due(&self) -> Option<Millis> {
        self.entries.keys().next().map(|(due, _)| *due)
    }

    /// Removes and returns the earliest task.
    ///
    /// Repeating tasks are marked as running until
    /// [`finish_running`](Self::finish_running) is called.
    pub fn dequeue(&mut self) -> Option<ScheduledTask> {
        let (_, scheduled) = self.entries.pop_first()?;
        self.index.remove(&scheduled.handle);
        if scheduled.task.period().is_some() {
            self.running.insert(scheduled.handle);
        }
        Some(scheduled)
    }

    /// Clears the running mark of a repeating task.
    ///
    /// Returns false if the task was cancelled while it ran.
    pub fn finish_running(&mut self, handle: TimerHandle) -> bool {
        self.running.remove(&handle)
    }

    /// Cancels a task by handle.
    ///
    /// Returns true if a queued (or running repeating) task was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        if let Some(key) = self.index.remove(&handle) {
            self.entries.remove(&key);
            return true;
        }
        self.running.remove(&handle)
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of tasks in the queue.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drops every queued task and returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        self.index.clear();
        self.running.clear();
        dropped
    }
}

/// A queue for microtasks.
///
/// Microtasks are drained completely, including the ones enqueued while
/// draining.
#[derive(Debug, Default)]
pub struct MicrotaskQueue {
    queue: VecDeque<(JobId, MicroTask)>,
}

impl MicrotaskQueue {
    /// Creates a new empty MicrotaskQueue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a microtask to the end of the queue.
    pub fn enqueue(&mut self, id: JobId, microtask: MicroTask) {
        self.queue.push_back((id, microtask));
    }

    /// Removes and returns the next microtask from the queue.
    pub fn dequeue(&mut self) -> Option<(JobId, MicroTask)> {
        self.queue.pop_front()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the number of microtasks in the queue.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Drops every queued microtask and returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Runs `job`. With `catch_panics` set, a panic becomes an `InternalError`
/// completion instead of unwinding into the caller.
pub(crate) fn run_guarded<T, F>(catch_panics: bool, job: F) -> Completion<T>
where
    F: FnOnce() -> Completion<T>,
{
    if !catch_panics {
        return job();
    }
    panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        Err(JsError::internal(format!("job panicked: {}", message)).into())
    })
}
