//! The tracer keeps track of "what is causally running right now".
//!
//! A trace is an `{event, target}` pair. [`run`] pushes one for the duration
//! of a synchronous call, restoring the previous trace on every exit path —
//! strict dynamic scoping, including unwinds. A partial trace merges onto the
//! active one, so a nested instrumented call that only knows its own target
//! still inherits the ancestor's event.
//!
//! Execution is single-threaded and cooperative; asynchronous gaps are
//! bridged by one of two strategies chosen once at initialization (see
//! [`strategy`]): both capture the trace when work is scheduled and restore
//! it when the work later runs, bracketed by a fresh async task unit.

use skein_recorder::{EventRef, TargetRef};
use std::cell::RefCell;

mod strategy;

pub use strategy::*;

/// The causally-active event/target pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Trace {
    pub event: Option<EventRef>,
    pub target: Option<TargetRef>,
}

impl Trace {
    pub fn new(event: Option<EventRef>, target: Option<TargetRef>) -> Self {
        Self { event, target }
    }
}

thread_local! {
    static CURRENT_TRACE: RefCell<Option<Trace>> = const { RefCell::new(None) };
}

/// The currently active trace, if any.
pub fn current_trace() -> Option<Trace> {
    CURRENT_TRACE.with(|current| *current.borrow())
}

/// Runs `f` with `trace` merged onto the active trace; fields `trace` leaves
/// unset are inherited from the ancestor. The previous trace is restored
/// whether `f` returns or unwinds.
pub fn run<R>(trace: Trace, f: impl FnOnce() -> R) -> R {
    let merged = {
        let current = current_trace();
        Trace {
            event: trace.event.or(current.and_then(|t| t.event)),
            target: trace.target.or(current.and_then(|t| t.target)),
        }
    };
    let _guard = swap_in(Some(merged));
    f()
}

/// Runs `f` with the trace state wholly replaced (no merge). Used by the
/// strategies to replay a captured trace on the far side of an async gap.
pub(crate) fn run_with_state<R>(state: Option<Trace>, f: impl FnOnce() -> R) -> R {
    let _guard = swap_in(state);
    f()
}

fn swap_in(next: Option<Trace>) -> TraceGuard {
    let previous = CURRENT_TRACE.with(|current| current.replace(next));
    TraceGuard { previous }
}

struct TraceGuard {
    previous: Option<Trace>,
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        CURRENT_TRACE.with(|current| {
            *current.borrow_mut() = self.previous;
        });
    }
}
