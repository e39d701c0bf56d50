//! Deterministic async runtime.
//!
//! This crate provides a single-threaded cooperative scheduler and the
//! promise machinery built on it:
//! - Event loop with a task (macrotask) queue and a microtask queue
//! - Promise state machine with thenable adoption
//! - Combinators: join-all, race, all-settled, any
//!
//! # Overview
//!
//! - [`EventLoop`] - Owns the queues and runs jobs in order
//! - [`Promise`] - Settle-once value whose reactions run as microtasks
//! - [`join_all`], [`race`], [`all_settled`], [`any`] - Promise composition
//! - [`Clock`] - Source of time for task due-times ([`VirtualClock`] by default)
//! - [`ErrorSink`] - Receives job errors and unhandled rejections
//!
//! Microtasks always drain completely, including the ones enqueued while
//! draining, before the next task runs. A job that fails is reported to the
//! sink and the loop carries on with the next job.
//!
//! # Examples
//!
//! ## Event Loop Usage
//!
//! ```
//! use async_runtime::{EventLoop, Task};
//!
//! let event_loop = EventLoop::new();
//! event_loop.schedule_macrotask(Task::new(|| Ok(())), 10);
//! let stats = event_loop.run_until_idle().unwrap();
//! assert_eq!(stats.macrotasks_run, 1);
//! assert_eq!(event_loop.now(), 10);
//! ```
//!
//! ## Promise Usage
//!
//! ```
//! use async_runtime::{EventLoop, Promise, PromiseState};
//! use core_types::Value;
//!
//! let event_loop = EventLoop::new();
//! let promise = Promise::new(&event_loop, |resolver| {
//!     resolver.resolve(Value::Smi(42));
//!     Ok(())
//! });
//! assert_eq!(
//!     event_loop.run_until_settled(&promise).unwrap(),
//!     PromiseState::Fulfilled(Value::Smi(42))
//! );
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod combinators;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod promise;
mod rejection;
pub mod report;
pub mod task_queue;

// Re-export main types at crate root
pub use clock::{Clock, Millis, SystemClock, VirtualClock};
pub use combinators::{all_settled, any, join_all, race, SettledOutcome};
pub use config::{RuntimeConfig, DEFAULT_MAX_ADOPTION_DEPTH};
pub use error::{RuntimeError, RuntimeResult};
pub use event_loop::{EventLoop, EventLoopBuilder, LoopStats, Turn};
pub use promise::{Deferred, Handler, Promise, PromiseId, PromiseState, Resolver};
pub use report::{CollectingSink, ErrorReport, ErrorSink, TracingSink};
pub use task_queue::{JobId, MicroTask, MicrotaskQueue, ScheduledTask, Task, TaskQueue, TimerHandle};
