//! Time sources for macrotask due-times.
//!
//! The event loop only compares due-times and asks the clock to wait for
//! the earliest one. [`VirtualClock`] makes that wait a jump, which keeps
//! every run deterministic; [`SystemClock`] actually sleeps.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Milliseconds since the clock's origin.
pub type Millis = u64;

/// Supplies due-times for macrotasks.
pub trait Clock {
    /// Current time.
    fn now(&self) -> Millis;

    /// Blocks (or jumps) until `now() >= due`.
    fn wait_until(&self, due: Millis);
}

/// Manually driven clock.
///
/// Time only moves when the loop waits for a macrotask or when a caller
/// advances it. It never moves backward.
///
/// # Examples
///
/// ```
/// use async_runtime::{Clock, VirtualClock};
///
/// let clock = VirtualClock::new();
/// clock.advance_to(100);
/// clock.advance_to(50);
/// assert_eq!(clock.now(), 100);
/// ```
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Cell<Millis>,
}

impl VirtualClock {
    /// Creates a clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock at the given time.
    pub fn starting_at(now: Millis) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    /// Moves the clock to `time`; earlier times are ignored.
    pub fn advance_to(&self, time: Millis) {
        if time > self.now.get() {
            self.now.set(time);
        }
    }

    /// Moves the clock forward by `delta`.
    pub fn advance_by(&self, delta: Millis) {
        self.now.set(self.now.get().saturating_add(delta));
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Millis {
        self.now.get()
    }

    fn wait_until(&self, due: Millis) {
        self.advance_to(due);
    }
}

/// Wall clock measured from its creation.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }

    fn wait_until(&self, due: Millis) {
        let now = self.now();
        if due > now {
            std::thread::sleep(Duration::from_millis(due - now));
        }
    }
}
