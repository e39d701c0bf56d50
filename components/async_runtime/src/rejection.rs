//! Unhandled-rejection bookkeeping.
//!
//! A promise rejected while it has no reactions is remembered here. At the
//! next microtask checkpoint, entries that still have no reaction are
//! reported once. A reaction attached later turns into a
//! `rejection_handled` notification. Reported entries are dropped once their
//! promise is gone, since nothing can attach to it any more.

use crate::promise::PromiseId;
use core_types::Value;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

#[derive(Debug)]
struct PendingRejection {
    promise: PromiseId,
    reason: Value,
    handled: Rc<Cell<bool>>,
}

/// Tracks rejections that may end up unhandled.
#[derive(Debug, Default)]
pub(crate) struct RejectionTracker {
    pending: Vec<PendingRejection>,
    reported: HashMap<PromiseId, Weak<Cell<bool>>>,
}

impl RejectionTracker {
    /// Remembers a rejection that currently has no reaction.
    pub(crate) fn track(&mut self, promise: PromiseId, reason: Value, handled: Rc<Cell<bool>>) {
        self.pending.push(PendingRejection {
            promise,
            reason,
            handled,
        });
    }

    /// Records that a reaction was attached to a rejected promise.
    ///
    /// Returns true if the rejection had already been reported.
    pub(crate) fn handled(&mut self, promise: PromiseId) -> bool {
        self.pending.retain(|entry| entry.promise != promise);
        self.reported.remove(&promise).is_some()
    }

    /// Takes every tracked rejection that is still unhandled, in rejection
    /// order, and marks it as reported.
    ///
    /// Reported entries whose promise has been dropped are pruned here.
    pub(crate) fn take_unhandled(&mut self) -> Vec<(PromiseId, Value)> {
        let mut unhandled = Vec::new();
        for entry in self.pending.drain(..) {
            if entry.handled.get() {
                continue;
            }
            self.reported
                .insert(entry.promise, Rc::downgrade(&entry.handled));
            unhandled.push((entry.promise, entry.reason));
        }
        self.reported.retain(|_, handled| handled.strong_count() > 0);
        unhandled
    }

    /// Number of reported rejections still waiting for a late handler.
    #[cfg(test)]
    pub(crate) fn reported_len(&self) -> usize {
        self.reported.len()
    }

    /// Forgets everything.
    pub(crate) fn clear(&mut self) {
        self.pending.clear();
        self.reported.clear();
    }
}
