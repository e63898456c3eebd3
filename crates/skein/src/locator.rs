//! Location provider contract, plus the synchronous default backed by
//! `#[track_caller]`.

use skein_types::{DeclarationLocations, LocationsPromise, SourceLocation};

/// Stack frames between each instrumented entry point and the user code
/// that called it. An asynchronous locator adds these to whatever offset it
/// computes from its own capture machinery.
pub const CREATOR_FRAMES: u32 = 1;
pub const CONSTRUCTOR_FRAMES: u32 = 1;
pub const OPERATOR_FRAMES: u32 = 1;
pub const SUBSCRIBE_FRAMES: u32 = 1;
pub const EMISSION_FRAMES: u32 = 1;

/// Call-site capture, taken where `#[track_caller]` propagation ends.
#[derive(Clone, Copy, Debug)]
pub struct Source {
    location: &'static std::panic::Location<'static>,
}

impl Source {
    #[track_caller]
    pub fn caller() -> Self {
        Self {
            location: std::panic::Location::caller(),
        }
    }

    pub fn to_location(self) -> SourceLocation {
        SourceLocation {
            file: self.location.file().to_string(),
            line: self.location.line(),
            column: self.location.column(),
        }
    }
}

/// Resolves declaration locations, possibly asynchronously (stack walking
/// plus source maps). The returned promise may resolve after the declaration
/// is already visible in the graph; it may also fail, in which case the
/// declaration simply keeps no locations.
pub trait Locator {
    fn locate(&self, source: Source, stack_offset: u32) -> LocationsPromise;
}

/// Default locator: resolves immediately with the generated location from
/// `#[track_caller]`, no source-mapped side. Lets adapters run without a
/// stack/source-map resolver.
pub struct CallerLocator;

impl Locator for CallerLocator {
    fn locate(&self, source: Source, _stack_offset: u32) -> LocationsPromise {
        LocationsPromise::resolved(DeclarationLocations {
            generated: Some(source.to_location()),
            original: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_locator_resolves_immediately() {
        let promise = CallerLocator.locate(Source::caller(), CREATOR_FRAMES);
        let locations = promise.peek().expect("must be resolved synchronously");
        let generated = locations.generated.expect("generated location present");
        assert!(generated.file.ends_with("locator.rs"));
        assert!(locations.original.is_none());
    }
}
