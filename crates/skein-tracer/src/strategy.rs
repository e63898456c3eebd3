//! Async-boundary strategies.
//!
//! Both carry the active trace across a scheduling gap and bracket the
//! resumed work with a named async task unit. Which one applies depends on
//! host capability, decided once at initialization:
//!
//! - [`TaskInterceptor`]: the host exposes a forkable execution context with
//!   task lifecycle hooks. The trace rides along as a context property
//!   captured at fork time.
//! - [`SchedulerPatcher`]: everywhere else. Each statically enumerable
//!   scheduler is wrapped so that scheduling captures the trace into the
//!   work closure. Schedulers created after initialization are not
//!   instrumented; that gap is accepted, not papered over.

use crate::{Trace, current_trace, run_with_state};
use skein_recorder::Recorder;
use std::rc::Rc;
use std::time::Duration;
use tracing::debug;

/// A host scheduler: anything that takes a work closure now and runs it
/// later (timer, microtask queue, animation frame, ...).
pub trait Scheduler {
    fn name(&self) -> &str;
    fn schedule(&self, delay: Option<Duration>, work: Box<dyn FnOnce()>);
}

fn task_name(origin: &str, delay: Option<Duration>) -> String {
    match delay {
        Some(delay) => format!("{origin} {}ms", delay.as_millis()),
        None => origin.to_string(),
    }
}

// ── Scheduler patching ──────────────────────────────────────────

/// A scheduler wrapped at initialization time. Hand this back to the host in
/// place of the original: work scheduled through it re-enters with the trace
/// that was active at schedule time, inside its own task unit.
pub struct PatchedScheduler {
    inner: Rc<dyn Scheduler>,
    recorder: Recorder,
}

impl Scheduler for PatchedScheduler {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn schedule(&self, delay: Option<Duration>, work: Box<dyn FnOnce()>) {
        let captured = current_trace();
        let recorder = self.recorder.clone();
        let name = task_name(self.inner.name(), delay);
        self.inner.schedule(
            delay,
            Box::new(move || {
                // The scheduled callback opens a new batch.
                recorder.end_batch();
                let _unit = recorder.task_scope(&name);
                run_with_state(captured, work);
            }),
        );
    }
}

/// Wraps every enumerated scheduler once.
#[derive(Clone)]
pub struct SchedulerPatcher {
    patched: Vec<Rc<PatchedScheduler>>,
}

impl SchedulerPatcher {
    pub fn install(recorder: Recorder, schedulers: Vec<Rc<dyn Scheduler>>) -> Self {
        let patched = schedulers
            .into_iter()
            .map(|inner| {
                Rc::new(PatchedScheduler {
                    inner,
                    recorder: recorder.clone(),
                })
            })
            .collect();
        Self { patched }
    }

    pub fn patched(&self) -> &[Rc<PatchedScheduler>] {
        &self.patched
    }
}

// ── Task interception ───────────────────────────────────────────

/// Where an intercepted task came from, for naming its unit.
#[derive(Debug, Clone)]
pub struct TaskOrigin {
    pub source: String,
    pub delay: Option<Duration>,
}

/// Trace state captured when the host forked its execution context.
/// Opaque: only [`TaskInterceptor::run_task`] consumes it.
#[derive(Debug, Clone, Copy)]
pub struct ContextFork {
    trace: Option<Trace>,
}

/// Bridges a host with forkable execution contexts and task lifecycle hooks.
///
/// The host calls [`fork`](Self::fork) wherever it snapshots its context and
/// [`run_task`](Self::run_task) around each task invocation.
#[derive(Clone)]
pub struct TaskInterceptor {
    recorder: Recorder,
}

impl TaskInterceptor {
    pub fn new(recorder: Recorder) -> Self {
        Self { recorder }
    }

    /// Captures the active trace as a context property.
    pub fn fork(&self) -> ContextFork {
        ContextFork {
            trace: current_trace(),
        }
    }

    /// Runs one task: new batch, named task unit, captured trace replayed.
    pub fn run_task<R>(
        &self,
        origin: &TaskOrigin,
        fork: &ContextFork,
        f: impl FnOnce() -> R,
    ) -> R {
        self.recorder.end_batch();
        let name = task_name(&origin.source, origin.delay);
        let _unit = self.recorder.task_scope(&name);
        run_with_state(fork.trace, f)
    }
}

// ── Selection ───────────────────────────────────────────────────

/// What the host can do, probed once before initialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCapabilities {
    /// True when a forkable execution context with task lifecycle hooks is
    /// available.
    pub forkable_context: bool,
}

/// The strategy in effect. Selected once; never revisited.
#[derive(Clone)]
pub enum TracerStrategy {
    TaskIntercept(TaskInterceptor),
    SchedulerPatch(SchedulerPatcher),
}

impl TracerStrategy {
    pub fn select(
        recorder: &Recorder,
        capabilities: HostCapabilities,
        schedulers: Vec<Rc<dyn Scheduler>>,
    ) -> Self {
        if capabilities.forkable_context {
            debug!("tracer strategy: task interception");
            Self::TaskIntercept(TaskInterceptor::new(recorder.clone()))
        } else {
            debug!(
                scheduler_count = schedulers.len(),
                "tracer strategy: scheduler patching"
            );
            Self::SchedulerPatch(SchedulerPatcher::install(recorder.clone(), schedulers))
        }
    }

    pub fn interceptor(&self) -> Option<&TaskInterceptor> {
        match self {
            Self::TaskIntercept(interceptor) => Some(interceptor),
            Self::SchedulerPatch(_) => None,
        }
    }

    pub fn patched_schedulers(&self) -> &[Rc<PatchedScheduler>] {
        match self {
            Self::TaskIntercept(_) => &[],
            Self::SchedulerPatch(patcher) => patcher.patched(),
        }
    }
}
