//! Wrapping for the subscribe extension point and the instrumented
//! subscriber that records every delivery flowing through it.

use crate::{
    Attached, AttachedSubscriber, DynError, EMISSION_FRAMES, Engine, Observer,
    SUBSCRIBE_FRAMES, Source, SubscriberLike, current,
};
use skein_recorder::{Destination, EventRef, SubscriptionRef, TargetRef};
use skein_tracer::Trace;
use skein_types::{EventKind, ObserverForm};

/// What the user handed to `subscribe`, already normalized by the adapter.
pub enum SubscribeArgs<T> {
    /// Zero to three bare callbacks.
    Callbacks {
        next: Option<Box<dyn FnMut(T)>>,
        error: Option<Box<dyn FnMut(DynError)>>,
        complete: Option<Box<dyn FnMut()>>,
    },
    /// An observer object without a graph attachment slot.
    Partial(Box<dyn SubscriberLike<T>>),
    /// An observer object with an attachment slot. If a target is actually
    /// attached (a subject), it becomes the subscription's destination.
    Observer(Box<dyn AttachedSubscriber<T>>),
}

struct Classified<T> {
    observer: Box<dyn SubscriberLike<T>>,
    form: ObserverForm,
    subject_target: Option<TargetRef>,
}

fn classify<T: 'static>(args: SubscribeArgs<T>) -> Classified<T> {
    match args {
        SubscribeArgs::Callbacks {
            next,
            error,
            complete,
        } => {
            let form = ObserverForm::Callbacks {
                has_next: next.is_some(),
                has_error: error.is_some(),
                has_complete: complete.is_some(),
            };
            Classified {
                observer: Box::new(CallbackObserver {
                    next,
                    error,
                    complete,
                    closed: false,
                }),
                form,
                subject_target: None,
            }
        }
        SubscribeArgs::Partial(observer) => Classified {
            observer,
            form: ObserverForm::Partial,
            subject_target: None,
        },
        SubscribeArgs::Observer(observer) => {
            // Read the attachment before the box is consumed; an attached
            // observer is a subject and routes the subscription to it.
            let subject_target = observer.attachment().get();
            let form = if subject_target.is_some() {
                ObserverForm::Subject
            } else {
                ObserverForm::Full
            };
            Classified {
                observer,
                form,
                subject_target,
            }
        }
    }
}

/// Wraps a subscribe call on `source`. `do_subscribe` performs the host's
/// actual subscription with the (possibly instrumented) subscriber it is
/// given and returns whatever the host returns.
///
/// With no engine, or with `source` carrying no attachment, the observer is
/// normalized but nothing is recorded and no trace scope is entered.
#[track_caller]
pub fn wrap_subscribe<T, Src, F, R>(source: &Src, args: SubscribeArgs<T>, do_subscribe: F) -> R
where
    T: 'static,
    Src: Attached,
    F: FnOnce(Box<dyn SubscriberLike<T>>) -> R,
{
    let site = Source::caller();
    let classified = classify(args);
    let (Some(engine), Some(instance)) = (current(), source.attachment().instance()) else {
        return do_subscribe(classified.observer);
    };

    let recorder = engine.recorder();
    let ambient = skein_tracer::current_trace();
    let destination = classified
        .subject_target
        .or_else(|| ambient.and_then(|trace| trace.target))
        .map(Destination::from);
    let subscription = recorder.subscription(classified.form, instance, destination.clone());
    // Deliveries run "toward" the destination when it has a graph presence,
    // otherwise on the subscription itself.
    let run_target = destination
        .as_ref()
        .and_then(Destination::target)
        .unwrap_or(TargetRef::Subscription(subscription));

    let locations = engine.locator().locate(site, SUBSCRIBE_FRAMES);
    let declaration = recorder.declare("subscribe", None, Some(locations));
    let event = recorder.subscription_event(
        EventKind::Subscribe,
        declaration,
        subscription,
        ambient.and_then(|trace| trace.event),
    );

    let subscriber = Box::new(InstrumentedSubscriber {
        inner: classified.observer,
        engine: engine.clone(),
        subscription,
        run_target,
    });
    skein_tracer::run(
        Trace::new(Some(event), Some(TargetRef::Subscription(subscription))),
        || do_subscribe(subscriber),
    )
}

/// Observer built from bare callbacks, with the usual terminal semantics:
/// `error`, `complete`, and `unsubscribe` all close it.
struct CallbackObserver<T> {
    next: Option<Box<dyn FnMut(T)>>,
    error: Option<Box<dyn FnMut(DynError)>>,
    complete: Option<Box<dyn FnMut()>>,
    closed: bool,
}

impl<T> Observer<T> for CallbackObserver<T> {
    fn next(&mut self, value: T) {
        if self.closed {
            return;
        }
        if let Some(next) = &mut self.next {
            next(value);
        }
    }

    fn error(&mut self, error: DynError) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(callback) = &mut self.error {
            callback(error);
        }
    }

    fn complete(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(complete) = &mut self.complete {
            complete();
        }
    }
}

impl<T> SubscriberLike<T> for CallbackObserver<T> {
    fn unsubscribe(&mut self) {
        self.closed = true;
    }

    fn closed(&self) -> bool {
        self.closed
    }
}

/// The subscriber handed to the host by [`wrap_subscribe`]: records every
/// delivery as a subscription event and scopes the trace so work the
/// delivery triggers is attributed to it.
pub struct InstrumentedSubscriber<T> {
    inner: Box<dyn SubscriberLike<T>>,
    engine: Engine,
    subscription: SubscriptionRef,
    run_target: TargetRef,
}

impl<T> InstrumentedSubscriber<T> {
    pub fn subscription(&self) -> SubscriptionRef {
        self.subscription
    }

    fn record(&self, kind: EventKind, source: Source) -> EventRef {
        let locations = self.engine.locator().locate(source, EMISSION_FRAMES);
        let declaration = self.engine.recorder().declare(kind.label(), None, Some(locations));
        let parent = skein_tracer::current_trace().and_then(|trace| trace.event);
        self.engine
            .recorder()
            .subscription_event(kind, declaration, self.subscription, parent)
    }

    fn run_scoped(&mut self, event: EventRef, deliver: impl FnOnce(&mut dyn SubscriberLike<T>)) {
        let trace = Trace::new(Some(event), Some(self.run_target));
        let inner = &mut *self.inner;
        skein_tracer::run(trace, || deliver(inner));
    }
}

impl<T> Observer<T> for InstrumentedSubscriber<T> {
    fn next(&mut self, value: T) {
        if self.inner.closed() {
            return self.inner.next(value);
        }
        let event = self.record(EventKind::Next, Source::caller());
        self.run_scoped(event, |inner| inner.next(value));
    }

    fn error(&mut self, error: DynError) {
        if self.inner.closed() {
            return self.inner.error(error);
        }
        let event = self.record(EventKind::Error, Source::caller());
        self.run_scoped(event, |inner| inner.error(error));
    }

    fn complete(&mut self) {
        if self.inner.closed() {
            return self.inner.complete();
        }
        let event = self.record(EventKind::Complete, Source::caller());
        self.run_scoped(event, |inner| inner.complete());
    }
}

impl<T> SubscriberLike<T> for InstrumentedSubscriber<T> {
    fn unsubscribe(&mut self) {
        if self.inner.closed() {
            return self.inner.unsubscribe();
        }
        let event = self.record(EventKind::Unsubscribe, Source::caller());
        self.run_scoped(event, |inner| inner.unsubscribe());
    }

    fn closed(&self) -> bool {
        self.inner.closed()
    }
}
