//! The instrumented emission surface for subjects: producer-side calls that
//! feed values into a multicast instance.

use crate::{Attached, AttachmentSlot, DynError, EMISSION_FRAMES, Engine, Observer, Source, SubjectLike, current};
use skein_recorder::{EventRef, InstanceRef, TargetRef};
use skein_tracer::Trace;
use skein_types::EventKind;

/// Wraps a subject so its producer-side `next`/`error`/`complete` calls are
/// recorded as instance events, and the fan-out they trigger is traced back
/// to them.
///
/// A producer call is a legitimate causal root: when nothing is on the
/// ambient trace the recorded event simply has no preceding event. Calls on a
/// closed subject, or a subject never attached to the graph, forward
/// unrecorded.
pub struct InstrumentedSubject<S> {
    inner: S,
}

impl<S> InstrumentedSubject<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

fn record_emission(
    engine: &Engine,
    instance: InstanceRef,
    kind: EventKind,
    source: Source,
) -> EventRef {
    let locations = engine.locator().locate(source, EMISSION_FRAMES);
    let declaration = engine.recorder().declare(kind.label(), None, Some(locations));
    let parent = skein_tracer::current_trace().and_then(|trace| trace.event);
    engine.recorder().instance_event(kind, declaration, instance, parent)
}

fn emit<T, S: SubjectLike<T>>(
    subject: &mut InstrumentedSubject<S>,
    kind: EventKind,
    source: Source,
    deliver: impl FnOnce(&mut S),
) {
    let recordable = (!SubjectLike::closed(&subject.inner))
        .then(current)
        .flatten()
        .and_then(|engine| {
            subject
                .inner
                .attachment()
                .instance()
                .map(|instance| (engine, instance))
        });
    let Some((engine, instance)) = recordable else {
        return deliver(&mut subject.inner);
    };
    let event = record_emission(&engine, instance, kind, source);
    let trace = Trace::new(Some(event), Some(TargetRef::Instance(instance)));
    let inner = &mut subject.inner;
    skein_tracer::run(trace, || deliver(inner));
}

impl<T, S: SubjectLike<T>> Observer<T> for InstrumentedSubject<S> {
    fn next(&mut self, value: T) {
        emit::<T, S>(self, EventKind::Next, Source::caller(), |inner| {
            inner.next(value)
        });
    }

    fn error(&mut self, error: DynError) {
        emit::<T, S>(self, EventKind::Error, Source::caller(), |inner| {
            inner.error(error)
        });
    }

    fn complete(&mut self) {
        emit::<T, S>(self, EventKind::Complete, Source::caller(), |inner| {
            inner.complete()
        });
    }
}

impl<S: Attached> Attached for InstrumentedSubject<S> {
    fn attachment(&self) -> &AttachmentSlot {
        self.inner.attachment()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::install_test_engine;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct TestSubject {
        attachment: AttachmentSlot,
        closed: bool,
        seen: Rc<RefCell<Vec<i32>>>,
    }

    impl TestSubject {
        fn new(seen: &Rc<RefCell<Vec<i32>>>) -> Self {
            Self {
                attachment: AttachmentSlot::new(),
                closed: false,
                seen: Rc::clone(seen),
            }
        }
    }

    impl Observer<i32> for TestSubject {
        fn next(&mut self, value: i32) {
            self.seen.borrow_mut().push(value);
        }

        fn error(&mut self, _error: DynError) {
            self.closed = true;
        }

        fn complete(&mut self) {
            self.closed = true;
        }
    }

    impl Attached for TestSubject {
        fn attachment(&self) -> &AttachmentSlot {
            &self.attachment
        }
    }

    impl SubjectLike<i32> for TestSubject {
        fn closed(&self) -> bool {
            self.closed
        }
    }

    fn attached_subject(
        engine: &crate::Engine,
        seen: &Rc<RefCell<Vec<i32>>>,
    ) -> InstrumentedSubject<TestSubject> {
        let declaration = engine.recorder().declare("Subject", None, None);
        let instance = engine.recorder().instance(declaration, None);
        let subject = InstrumentedSubject::new(TestSubject::new(seen));
        subject.attachment().attach(TargetRef::Instance(instance));
        subject
    }

    #[test]
    fn producer_call_records_a_rooted_instance_event() {
        let engine = install_test_engine();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut subject = attached_subject(&engine, &seen);
        let instance = subject.attachment().instance().expect("attached");

        subject.next(42);
        assert_eq!(*seen.borrow(), vec![42]);

        let events = engine.recorder().target_events(TargetRef::Instance(instance));
        assert_eq!(events.len(), 1);
        let record = engine.recorder().event_record(events[0]);
        assert_eq!(record.kind, EventKind::Next);
        assert_eq!(record.preceding, None, "producer call is a causal root");
    }

    #[test]
    fn emission_inherits_an_ambient_cause() {
        let engine = install_test_engine();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut subject = attached_subject(&engine, &seen);
        let instance = subject.attachment().instance().expect("attached");

        let declaration = engine.recorder().declare("tick", None, None);
        let cause = engine
            .recorder()
            .instance_event(EventKind::Next, declaration, instance, None);
        skein_tracer::run(Trace::new(Some(cause), None), || subject.next(1));

        let events = engine.recorder().target_events(TargetRef::Instance(instance));
        let emitted = engine.recorder().event_record(events[1]);
        assert_eq!(emitted.preceding, Some(cause.id()));
        assert_eq!(engine.recorder().event_succeeding(cause), vec![events[1]]);
    }

    #[test]
    fn closed_or_unattached_subjects_forward_unrecorded() {
        let engine = install_test_engine();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let mut unattached = InstrumentedSubject::new(TestSubject::new(&seen));
        unattached.next(1);
        assert_eq!(*seen.borrow(), vec![1]);
        assert_eq!(engine.recorder().event_count(), 0);

        let mut subject = attached_subject(&engine, &seen);
        subject.get_mut().closed = true;
        subject.next(2);
        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(engine.recorder().event_count(), 0);
    }
}
