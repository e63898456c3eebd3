//! Source locations for declarations, and the eventually-resolved cell a
//! location provider fills in.
//!
//! Resolving a source-mapped location may involve fetching and parsing a
//! source map, so it finishes *after* the declaration is already visible in
//! the graph. Consumers read whatever is there at the time; absence is normal.

use facet::Facet;
use std::sync::{Arc, Mutex};

/// A `{file, line, column}` triple.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// Generated and/or source-mapped location pair for a declaration.
///
/// Either side may be absent: the generated location when capture failed,
/// the original one when no source map resolves.
#[derive(Facet, Debug, Clone, PartialEq, Eq, Default)]
pub struct DeclarationLocations {
    pub generated: Option<SourceLocation>,
    pub original: Option<SourceLocation>,
}

type Continuation = Box<dyn FnOnce(&DeclarationLocations) + Send>;

enum PromiseState {
    Pending(Vec<Continuation>),
    Resolved(DeclarationLocations),
    Failed,
}

/// A resolve-once cell for declaration locations.
///
/// The location provider hands one of these back immediately; the recorder
/// installs a continuation that patches the declaration record when the
/// provider eventually resolves. Failure drops the continuations: the
/// declaration simply keeps whatever locations it already has, and nothing
/// is propagated to the caller.
#[derive(Clone)]
pub struct LocationsPromise {
    inner: Arc<Mutex<PromiseState>>,
}

impl LocationsPromise {
    /// A promise that is already resolved.
    pub fn resolved(locations: DeclarationLocations) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PromiseState::Resolved(locations))),
        }
    }

    /// A pending promise plus the resolver that completes it.
    pub fn pending() -> (Self, LocationsResolver) {
        let inner = Arc::new(Mutex::new(PromiseState::Pending(Vec::new())));
        (
            Self {
                inner: Arc::clone(&inner),
            },
            LocationsResolver { inner },
        )
    }

    /// Runs `f` once the promise resolves. Runs immediately if it already has.
    /// Never runs if the promise fails.
    pub fn on_resolve(&self, f: impl FnOnce(&DeclarationLocations) + Send + 'static) {
        let mut state = self.inner.lock().expect("locations promise lock poisoned");
        match &mut *state {
            PromiseState::Pending(continuations) => continuations.push(Box::new(f)),
            PromiseState::Resolved(locations) => {
                let locations = locations.clone();
                drop(state);
                f(&locations);
            }
            PromiseState::Failed => {}
        }
    }

    /// The resolved locations, if resolution already happened.
    pub fn peek(&self) -> Option<DeclarationLocations> {
        match &*self.inner.lock().expect("locations promise lock poisoned") {
            PromiseState::Resolved(locations) => Some(locations.clone()),
            _ => None,
        }
    }
}

/// Completion side of a [`LocationsPromise`].
pub struct LocationsResolver {
    inner: Arc<Mutex<PromiseState>>,
}

impl LocationsResolver {
    /// Resolves the promise and runs all installed continuations.
    pub fn resolve(self, locations: DeclarationLocations) {
        let continuations = {
            let mut state = self.inner.lock().expect("locations promise lock poisoned");
            match std::mem::replace(&mut *state, PromiseState::Resolved(locations.clone())) {
                PromiseState::Pending(continuations) => continuations,
                // Resolve after resolve/fail is a provider bug; keep the first outcome.
                other => {
                    *state = other;
                    Vec::new()
                }
            }
        };
        for continuation in continuations {
            continuation(&locations);
        }
    }

    /// Marks the promise failed, dropping pending continuations.
    pub fn fail(self) {
        let mut state = self.inner.lock().expect("locations promise lock poisoned");
        if matches!(&*state, PromiseState::Pending(_)) {
            *state = PromiseState::Failed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn some_locations() -> DeclarationLocations {
        DeclarationLocations {
            generated: Some(SourceLocation {
                file: "bundle.js".into(),
                line: 10,
                column: 4,
            }),
            original: None,
        }
    }

    #[test]
    fn continuation_runs_on_resolve() {
        let (promise, resolver) = LocationsPromise::pending();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in = Arc::clone(&hits);
        promise.on_resolve(move |locations| {
            assert!(locations.generated.is_some());
            hits_in.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(promise.peek().is_none());

        resolver.resolve(some_locations());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(promise.peek(), Some(some_locations()));
    }

    #[test]
    fn continuation_runs_immediately_when_already_resolved() {
        let promise = LocationsPromise::resolved(some_locations());
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in = Arc::clone(&hits);
        promise.on_resolve(move |_| {
            hits_in.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_drops_continuations() {
        let (promise, resolver) = LocationsPromise::pending();
        promise.on_resolve(|_| panic!("must not run after failure"));
        resolver.fail();
        assert!(promise.peek().is_none());
    }
}
