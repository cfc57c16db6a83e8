#![forbid(unsafe_code)]

//! Notification scheduling with per-handler coalescing.
//!
//! Immediate dispatches run synchronously. Batched dispatches are parked in
//! an insertion-ordered queue keyed by [`WatcherId`] and run on the next
//! tick, which is an explicit [`Scheduler::flush`] call (the host event loop
//! decides when a tick happens).
//!
//! # Invariants
//!
//! 1. A watcher scheduled N times before its tick fires once, with the path
//!    of the last scheduling, at the position of the first.
//! 2. A flush runs exactly the entries pending when it started. Entries
//!    scheduled while it runs are left for the following tick.
//! 3. A cancelled entry never fires, even if its batch is mid-flush.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Handler panics | Bug in handler | Panic propagates; remaining entries stay queued |
//! | Endless rescheduling | Handler writes what it watches | `run_until_idle` stops after the round limit and logs a warning |

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{trace, warn};

use crate::key::Key;
use crate::watch::{DispatchMode, Handler, WatcherId};

struct Pending {
    handler: Handler,
    path: Rc<[Key]>,
    tick: u64,
}

/// Coalescing notification queue.
#[derive(Default)]
pub struct Scheduler {
    pending: RefCell<IndexMap<WatcherId, Pending, ahash::RandomState>>,
    tick: Cell<u64>,
    dispatched: Cell<u64>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending_len())
            .field("tick", &self.tick.get())
            .field("dispatched", &self.dispatched.get())
            .finish()
    }
}

impl Scheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch `handler` for `path`, now or on the next tick.
    pub fn dispatch(&self, id: WatcherId, handler: Handler, path: Rc<[Key]>, mode: DispatchMode) {
        match mode {
            DispatchMode::Immediate => {
                self.dispatched.set(self.dispatched.get() + 1);
                handler(&path);
            }
            DispatchMode::Batched => {
                let mut pending = self.pending.borrow_mut();
                if let Some(entry) = pending.get_mut(&id) {
                    entry.path = path;
                    return;
                }
                pending.insert(
                    id,
                    Pending {
                        handler,
                        path,
                        tick: self.tick.get(),
                    },
                );
            }
        }
    }

    /// Drop a pending dispatch. Returns whether one was pending.
    pub fn cancel(&self, id: WatcherId) -> bool {
        let removed = self.pending.borrow_mut().shift_remove(&id).is_some();
        if removed {
            trace!(watcher = id.get(), "cancelled pending dispatch");
        }
        removed
    }

    /// Run one tick. Returns the number of handlers invoked.
    pub fn flush(&self) -> usize {
        let tick = self.tick.get();
        self.tick.set(tick + 1);
        let mut ran = 0;
        loop {
            let next = {
                let mut pending = self.pending.borrow_mut();
                match pending.first() {
                    Some((_, entry)) if entry.tick <= tick => pending.shift_remove_index(0),
                    _ => None,
                }
            };
            let Some((_, entry)) = next else { break };
            ran += 1;
            self.dispatched.set(self.dispatched.get() + 1);
            (entry.handler)(&entry.path);
        }
        if ran > 0 {
            trace!(tick, ran, "scheduler tick");
        }
        ran
    }

    /// Flush until nothing is pending or `max_rounds` ticks have run.
    ///
    /// Returns the total number of handlers invoked.
    pub fn run_until_idle(&self, max_rounds: usize) -> usize {
        let mut total = 0;
        for _ in 0..max_rounds {
            if self.is_idle() {
                return total;
            }
            total += self.flush();
        }
        if !self.is_idle() {
            warn!(
                pending = self.pending_len(),
                max_rounds, "scheduler still busy after round limit"
            );
        }
        total
    }

    /// Number of pending batched dispatches.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Whether `id` has a pending dispatch.
    #[must_use]
    pub fn is_pending(&self, id: WatcherId) -> bool {
        self.pending.borrow().contains_key(&id)
    }

    /// Total handler invocations so far, immediate and batched.
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.dispatched.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::path_string;
    use tracing_test::traced_test;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, Handler) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let handler: Handler = Rc::new(move |path: &[Key]| sink.borrow_mut().push(path_string(path)));
        (log, handler)
    }

    fn path(s: &str) -> Rc<[Key]> {
        s.split('.').map(Key::from).collect()
    }

    #[test]
    fn immediate_runs_synchronously() {
        let scheduler = Scheduler::new();
        let (log, handler) = recorder();
        scheduler.dispatch(WatcherId(1), handler, path("a"), DispatchMode::Immediate);
        assert_eq!(*log.borrow(), vec!["a"]);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn batched_coalesces_to_last_path() {
        let scheduler = Scheduler::new();
        let (log, handler) = recorder();
        for i in 0..10 {
            scheduler.dispatch(
                WatcherId(1),
                Rc::clone(&handler),
                path(&format!("items.{i}")),
                DispatchMode::Batched,
            );
        }
        assert!(log.borrow().is_empty());
        assert_eq!(scheduler.flush(), 1);
        assert_eq!(*log.borrow(), vec!["items.9"]);
    }

    #[test]
    fn batched_preserves_first_schedule_order() {
        let scheduler = Scheduler::new();
        let (log, handler) = recorder();
        scheduler.dispatch(WatcherId(1), Rc::clone(&handler), path("one"), DispatchMode::Batched);
        scheduler.dispatch(WatcherId(2), Rc::clone(&handler), path("two"), DispatchMode::Batched);
        scheduler.dispatch(WatcherId(1), Rc::clone(&handler), path("uno"), DispatchMode::Batched);
        scheduler.flush();
        assert_eq!(*log.borrow(), vec!["uno", "two"]);
    }

    #[test]
    fn cancel_prevents_dispatch() {
        let scheduler = Scheduler::new();
        let (log, handler) = recorder();
        scheduler.dispatch(WatcherId(1), handler, path("a"), DispatchMode::Batched);
        assert!(scheduler.cancel(WatcherId(1)));
        assert!(!scheduler.cancel(WatcherId(1)));
        assert_eq!(scheduler.flush(), 0);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn cancel_during_flush_skips_later_entry() {
        let scheduler = Rc::new(Scheduler::new());
        let (log, handler) = recorder();
        let weak = Rc::downgrade(&scheduler);
        let canceller: Handler = Rc::new(move |_: &[Key]| {
            if let Some(s) = weak.upgrade() {
                s.cancel(WatcherId(2));
            }
        });
        scheduler.dispatch(WatcherId(1), canceller, path("x"), DispatchMode::Batched);
        scheduler.dispatch(WatcherId(2), handler, path("y"), DispatchMode::Batched);
        assert_eq!(scheduler.flush(), 1);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn entries_scheduled_during_flush_wait_for_next_tick() {
        let scheduler = Rc::new(Scheduler::new());
        let (log, handler) = recorder();
        let weak = Rc::downgrade(&scheduler);
        let rescheduler: Handler = Rc::new(move |_: &[Key]| {
            if let Some(s) = weak.upgrade() {
                s.dispatch(WatcherId(2), Rc::clone(&handler), path("later"), DispatchMode::Batched);
            }
        });
        scheduler.dispatch(WatcherId(1), rescheduler, path("now"), DispatchMode::Batched);
        assert_eq!(scheduler.flush(), 1);
        assert!(log.borrow().is_empty());
        assert_eq!(scheduler.pending_len(), 1);
        assert_eq!(scheduler.flush(), 1);
        assert_eq!(*log.borrow(), vec!["later"]);
    }

    #[traced_test]
    #[test]
    fn run_until_idle_stops_at_round_limit() {
        let scheduler = Rc::new(Scheduler::new());
        let weak = Rc::downgrade(&scheduler);
        let again: Rc<RefCell<Option<Handler>>> = Rc::new(RefCell::new(None));
        let again_inner = Rc::clone(&again);
        let looping: Handler = Rc::new(move |_: &[Key]| {
            let handler = again_inner.borrow().clone();
            if let (Some(s), Some(h)) = (weak.upgrade(), handler) {
                s.dispatch(WatcherId(1), h, path("loop"), DispatchMode::Batched);
            }
        });
        *again.borrow_mut() = Some(Rc::clone(&looping));
        scheduler.dispatch(WatcherId(1), looping, path("loop"), DispatchMode::Batched);
        assert_eq!(scheduler.run_until_idle(5), 5);
        assert_eq!(scheduler.pending_len(), 1);
        assert!(logs_contain("scheduler still busy after round limit"));
        // Break the handler cycle.
        again.borrow_mut().take();
        scheduler.cancel(WatcherId(1));
    }
}
