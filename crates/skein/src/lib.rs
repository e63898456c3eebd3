//! Instrumentation facade for reactive-stream libraries.
//!
//! Per-library adapters re-export the host library's entry points wrapped
//! with the operations here: [`wrap_constructor`], [`wrap_creator`],
//! [`wrap_operator`], [`wrap_subscribe`], and the
//! [`InstrumentedSubject`]/[`InstrumentedSubscriber`] emission wrappers.
//! Each wrap follows the same protocol: declare, perform the real operation,
//! record a ref for the result, attach the ref to the live object, return.
//!
//! With no engine installed every operation is an identity pass-through —
//! the shape a production build with instrumentation compiled out gets, not
//! an error.

use skein_recorder::Recorder;
use skein_tracer::{HostCapabilities, Scheduler, TracerStrategy};
use std::cell::OnceCell;
use std::error::Error;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

mod attachment;
#[cfg(test)]
mod flow_tests;
mod host;
mod locator;
mod subject;
mod subscribe;
mod wrap;

pub use attachment::*;
pub use host::*;
pub use locator::*;
pub use subject::*;
pub use subscribe::*;
pub use wrap::*;

pub use skein_graph as graph;
pub use skein_recorder as recorder;
pub use skein_tracer as tracer;
pub use skein_types as types;

// ── Engine ──────────────────────────────────────────────────────

/// Everything the wrapping operations need, configured once.
///
/// Lives in a thread-local: execution is single-threaded cooperative, and
/// host handles (schedulers, locators) need not be `Send`.
#[derive(Clone)]
pub struct Engine {
    recorder: Recorder,
    strategy: TracerStrategy,
    locator: Rc<dyn Locator>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn strategy(&self) -> &TracerStrategy {
        &self.strategy
    }

    pub fn locator(&self) -> &Rc<dyn Locator> {
        &self.locator
    }
}

/// One-time engine configuration.
pub struct EngineConfig {
    pub recorder: Recorder,
    /// Probed host capability; picks the tracer strategy, once.
    pub capabilities: HostCapabilities,
    /// Schedulers enumerable at initialization time. Schedulers created
    /// later are not instrumented; their work is silently unrecorded.
    pub schedulers: Vec<Rc<dyn Scheduler>>,
    pub locator: Rc<dyn Locator>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallError {
    AlreadyInstalled,
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInstalled => write!(f, "skein engine is already installed"),
        }
    }
}

impl Error for InstallError {}

thread_local! {
    static ENGINE: OnceCell<Engine> = const { OnceCell::new() };
}

/// Installs the engine. First write wins; a second call is rejected.
pub fn install(config: EngineConfig) -> Result<Engine, InstallError> {
    let strategy =
        TracerStrategy::select(&config.recorder, config.capabilities, config.schedulers);
    let engine = Engine {
        recorder: config.recorder,
        strategy,
        locator: config.locator,
    };
    ENGINE.with(|cell| {
        cell.set(engine.clone())
            .map_err(|_| InstallError::AlreadyInstalled)
    })?;
    debug!("skein engine installed");
    Ok(engine)
}

pub(crate) fn current() -> Option<Engine> {
    ENGINE.with(|cell| cell.get().cloned())
}

pub fn installed() -> bool {
    ENGINE.with(|cell| cell.get().is_some())
}

/// The installed engine's recorder, for traversal and snapshot consumers.
pub fn engine_recorder() -> Option<Recorder> {
    current().map(|engine| engine.recorder.clone())
}

// ── Tagging ─────────────────────────────────────────────────────

/// Adds a user-facing tag to the instance attached to `value`. No-op when no
/// engine is installed or `value` carries no instance attachment.
pub fn add_tag<T: Attached>(value: &T, tag: &str) {
    if let Some(engine) = current() {
        if let Some(instance) = value.attachment().instance() {
            engine.recorder().add_tag(instance, tag);
        }
    }
}

/// Flags (or unflags) the attached instance as internal library plumbing,
/// eliding it from user-facing traversals.
pub fn set_internal<T: Attached>(value: &T, internal: bool) {
    if let Some(engine) = current() {
        if let Some(instance) = value.attachment().instance() {
            engine.recorder().set_internal(instance, internal);
        }
    }
}

// Re-exported so adapters can type destination targets without importing
// the recorder crate directly.
pub use skein_recorder::{Destination, EventRef, InstanceRef, SubscriptionRef, TargetRef};
pub use skein_types::EventKind;

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Installs a fresh engine for the current test thread. Thread-locals
    /// isolate tests from each other since each test runs on its own thread.
    pub(crate) fn install_test_engine() -> Engine {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        install(EngineConfig {
            recorder: Recorder::new(),
            capabilities: HostCapabilities::default(),
            schedulers: Vec::new(),
            locator: Rc::new(CallerLocator),
        })
        .expect("engine must install once per test thread")
    }

    /// Minimal host object: nothing but an attachment slot.
    pub(crate) struct FakeStream {
        attachment: AttachmentSlot,
    }

    impl FakeStream {
        pub(crate) fn new() -> Self {
            Self {
                attachment: AttachmentSlot::new(),
            }
        }
    }

    impl Attached for FakeStream {
        fn attachment(&self) -> &AttachmentSlot {
            &self.attachment
        }
    }

    /// A stream already present in the graph, as the wrap operations would
    /// leave it.
    pub(crate) fn recorded_stream(engine: &Engine, name: &str) -> FakeStream {
        let declaration = engine.recorder().declare(name, None, None);
        let instance = engine.recorder().instance(declaration, None);
        let stream = FakeStream::new();
        stream.attachment().attach(TargetRef::Instance(instance));
        stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::install_test_engine;

    #[test]
    fn install_is_first_write_wins() {
        let engine = install_test_engine();
        assert!(installed());
        let err = install(EngineConfig {
            recorder: Recorder::new(),
            capabilities: HostCapabilities::default(),
            schedulers: Vec::new(),
            locator: Rc::new(CallerLocator),
        })
        .expect_err("second install must be rejected");
        assert_eq!(err, InstallError::AlreadyInstalled);
        // The original engine is still the one in effect.
        assert!(engine_recorder().is_some());
        drop(engine);
    }

    #[test]
    fn uninstalled_thread_reports_nothing() {
        assert!(!installed());
        assert!(engine_recorder().is_none());
    }
}
