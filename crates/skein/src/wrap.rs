//! Wrapping operations for the construction-side extension points:
//! constructors, creator functions, and operator functions.
//!
//! All follow the same protocol: declare (with a location lookup for the
//! immediate caller), perform the real operation, record an instance for the
//! result, attach the ref to the live object, return it.

use crate::{
    Attached, CONSTRUCTOR_FRAMES, CREATOR_FRAMES, OPERATOR_FRAMES, Source, current,
};
use skein_recorder::TargetRef;
use skein_types::Callsite;

/// One level of the host's class hierarchy at construction time, innermost
/// (the actual `new`-target) first.
pub struct NewTarget<'a> {
    pub name: &'a str,
    pub parent: Option<&'a NewTarget<'a>>,
}

/// How many subclass levels sit between the wrapped constructor and the
/// actual new-target. `None` when the wrapped constructor is not in the
/// chain at all (a host inconsistency the caller treats as depth zero).
///
/// Each level is one extra internal stack frame between the user's `new`
/// and the wrapped constructor body; getting this wrong skews every
/// "declared at" location for subclassed instances.
pub fn subclass_depth(wrapped: &str, new_target: &NewTarget<'_>) -> Option<u32> {
    let mut depth = 0;
    let mut cursor = Some(new_target);
    while let Some(level) = cursor {
        if level.name == wrapped {
            return Some(depth);
        }
        depth += 1;
        cursor = level.parent;
    }
    None
}

/// Wraps a class-like constructor invocation.
#[track_caller]
pub fn wrap_constructor<T, F>(
    class_name: &str,
    new_target: &NewTarget<'_>,
    args: Vec<String>,
    construct: F,
) -> T
where
    T: Attached,
    F: FnOnce() -> T,
{
    let source = Source::caller();
    let Some(engine) = current() else {
        return construct();
    };
    let depth = subclass_depth(class_name, new_target).unwrap_or(0);
    let locations = engine.locator().locate(source, CONSTRUCTOR_FRAMES + depth);
    let declaration = engine.recorder().declare(
        class_name,
        Some(Callsite {
            function: class_name.to_string(),
            args,
        }),
        Some(locations),
    );
    let result = construct();
    let instance = engine.recorder().instance(declaration, None);
    result.attachment().attach(TargetRef::Instance(instance));
    result
}

/// Wraps a plain creator function returning a stream instance. The
/// declaration is recorded up front but only attached after the call, so the
/// instance exists first.
#[track_caller]
pub fn wrap_creator<T, F>(name: &str, args: Vec<String>, create: F) -> T
where
    T: Attached,
    F: FnOnce() -> T,
{
    let source = Source::caller();
    let Some(engine) = current() else {
        return create();
    };
    let locations = engine.locator().locate(source, CREATOR_FRAMES);
    let declaration = engine.recorder().declare(
        name,
        Some(Callsite {
            function: name.to_string(),
            args,
        }),
        Some(locations),
    );
    let result = create();
    let instance = engine.recorder().instance(declaration, None);
    result.attachment().attach(TargetRef::Instance(instance));
    result
}

/// Wraps an operator function: a call that returns a `source -> derived`
/// transform. The declaration belongs to this call (one per operator
/// application site); the instance is recorded per application to a source,
/// potentially many times, each linked to its own upstream instance.
#[track_caller]
pub fn wrap_operator<S, D, F>(name: &str, args: Vec<String>, operator: F) -> impl Fn(S) -> D
where
    S: Attached,
    D: Attached,
    F: Fn(S) -> D,
{
    let source = Source::caller();
    let site = current().map(|engine| {
        let locations = engine.locator().locate(source, OPERATOR_FRAMES);
        let declaration = engine.recorder().declare(
            name,
            Some(Callsite {
                function: name.to_string(),
                args,
            }),
            Some(locations),
        );
        (engine, declaration)
    });
    move |input: S| {
        let Some((engine, declaration)) = &site else {
            return operator(input);
        };
        let upstream = input.attachment().instance();
        let output = operator(input);
        let instance = engine.recorder().instance(*declaration, upstream);
        output.attachment().attach(TargetRef::Instance(instance));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeStream, install_test_engine};

    #[test]
    fn subclass_depth_walks_the_chain() {
        let base = NewTarget {
            name: "Observable",
            parent: None,
        };
        let mid = NewTarget {
            name: "Subject",
            parent: Some(&base),
        };
        let leaf = NewTarget {
            name: "BehaviorSubject",
            parent: Some(&mid),
        };

        assert_eq!(subclass_depth("BehaviorSubject", &leaf), Some(0));
        assert_eq!(subclass_depth("Subject", &leaf), Some(1));
        assert_eq!(subclass_depth("Observable", &leaf), Some(2));
        assert_eq!(subclass_depth("NotInChain", &leaf), None);
    }

    #[test]
    fn creator_declares_attaches_and_locates() {
        let engine = install_test_engine();
        let stream = wrap_creator("interval", vec!["100".to_string()], FakeStream::new);

        let instance = stream
            .attachment()
            .instance()
            .expect("creator must attach an instance ref");
        let declaration = engine
            .recorder()
            .declaration_record(engine.recorder().instance_declaration(instance));
        assert_eq!(declaration.name, "interval");
        assert_eq!(
            declaration.callsite.expect("callsite recorded").args,
            vec!["100".to_string()]
        );
        let locations = declaration
            .locations
            .expect("caller locator resolves synchronously");
        assert!(
            locations
                .generated
                .expect("generated location")
                .file
                .ends_with("wrap.rs")
        );
    }

    #[test]
    fn creator_is_identity_without_engine() {
        let stream = wrap_creator("interval", Vec::new(), FakeStream::new);
        assert_eq!(stream.attachment().get(), None);
    }

    #[test]
    fn constructor_records_the_wrapped_class() {
        let engine = install_test_engine();
        let base = NewTarget {
            name: "Observable",
            parent: None,
        };
        let leaf = NewTarget {
            name: "MyObservable",
            parent: Some(&base),
        };
        let stream = wrap_constructor("Observable", &leaf, Vec::new(), FakeStream::new);

        let instance = stream.attachment().instance().expect("attached");
        let declaration = engine
            .recorder()
            .declaration_record(engine.recorder().instance_declaration(instance));
        assert_eq!(declaration.name, "Observable");
    }

    #[test]
    fn operator_declares_once_but_records_an_instance_per_application() {
        let engine = install_test_engine();
        let map = wrap_operator("map", vec!["x => x + 1".to_string()], |_source: FakeStream| {
            FakeStream::new()
        });
        let declarations_after_wrap = engine.recorder().snapshot().declarations.len();

        let upstream_a = wrap_creator("of", Vec::new(), FakeStream::new);
        let upstream_b = wrap_creator("of", Vec::new(), FakeStream::new);
        let source_a = upstream_a.attachment().instance().expect("attached");
        let derived_a = map(upstream_a);
        let derived_b = map(upstream_b);

        // Two more declarations came from the two `of` creators, none from
        // applying the operator.
        assert_eq!(
            engine.recorder().snapshot().declarations.len(),
            declarations_after_wrap + 2
        );

        let instance_a = derived_a.attachment().instance().expect("attached");
        let instance_b = derived_b.attachment().instance().expect("attached");
        assert_ne!(instance_a, instance_b, "one instance per application");
        assert_eq!(
            engine.recorder().instance_source(instance_a),
            Some(source_a),
            "derived instance is linked to its upstream"
        );
    }
}
