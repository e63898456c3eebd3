//! End-to-end scenarios across the whole facade: wrap a pipeline, subscribe,
//! emit, then read the graph back through the traversal layer.

use crate::test_support::{FakeStream, install_test_engine};
use crate::{
    Attached, AttachmentSlot, DynError, Observer, SubscribeArgs, SubscriberLike, TargetRef,
    add_tag, graph, set_internal, wrap_creator, wrap_operator, wrap_subscribe,
};
use skein_tracer::Trace;
use skein_types::EventKind;
use std::cell::RefCell;
use std::rc::Rc;

struct FlowSubject {
    attachment: AttachmentSlot,
    closed: bool,
    seen: Rc<RefCell<Vec<i32>>>,
}

impl FlowSubject {
    fn new(seen: &Rc<RefCell<Vec<i32>>>) -> Self {
        Self {
            attachment: AttachmentSlot::new(),
            closed: false,
            seen: Rc::clone(seen),
        }
    }
}

impl Observer<i32> for FlowSubject {
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

impl SubscriberLike<i32> for FlowSubject {
    fn unsubscribe(&mut self) {
        self.closed = true;
    }

    fn closed(&self) -> bool {
        self.closed
    }
}

impl Attached for FlowSubject {
    fn attachment(&self) -> &AttachmentSlot {
        &self.attachment
    }
}

#[test]
fn pipeline_subscription_and_delivery_form_one_connected_graph() {
    let engine = install_test_engine();

    let source = wrap_creator("interval", vec!["100".to_string()], FakeStream::new);
    let map = wrap_operator("map", Vec::new(), |_input: FakeStream| FakeStream::new());
    let source_instance = source.attachment().instance().expect("attached");
    let derived = map(source);
    let derived_instance = derived.attachment().instance().expect("attached");
    add_tag(&derived, "doubled");

    // A subject as the observer becomes the subscription's destination.
    let seen = Rc::new(RefCell::new(Vec::new()));
    let subject = FlowSubject::new(&seen);
    let subject_declaration = engine.recorder().declare("Subject", None, None);
    let subject_instance = engine.recorder().instance(subject_declaration, None);
    subject
        .attachment()
        .attach(TargetRef::Instance(subject_instance));

    let mut subscriber = wrap_subscribe(
        &derived,
        SubscribeArgs::Observer(Box::new(subject)),
        |subscriber| subscriber,
    );
    let subscription = engine.recorder().instance_subscriptions(derived_instance)[0];

    let record = engine.recorder().subscription_record(subscription);
    assert_eq!(record.observer_form, skein_types::ObserverForm::Subject);
    assert_eq!(
        engine.recorder().subscription_destination(subscription),
        Some(crate::Destination::Instance(subject_instance))
    );

    subscriber.next(21);
    assert_eq!(*seen.borrow(), vec![21]);

    // The delivery event sits on the subscription; walking causality from it
    // reaches the subscribe event that set the pipeline running.
    let events = engine
        .recorder()
        .target_events(TargetRef::Subscription(subscription));
    assert_eq!(events.len(), 2);
    let delivery = engine.recorder().event_record(events[1]);
    assert_eq!(delivery.kind, EventKind::Next);

    // Structure: subject <- subscription <- derived <- source.
    let related = graph::related_targets(
        engine.recorder(),
        TargetRef::Subscription(subscription),
    );
    assert!(related.contains(&TargetRef::Instance(source_instance)));
    assert!(related.contains(&TargetRef::Instance(derived_instance)));
    assert!(related.contains(&TargetRef::Instance(subject_instance)));
}

#[test]
fn internal_pipeline_stages_are_elided_from_traversal() {
    let engine = install_test_engine();

    let source = wrap_creator("of", Vec::new(), FakeStream::new);
    let plumbing_op = wrap_operator("observeOn", Vec::new(), |_input: FakeStream| {
        FakeStream::new()
    });
    let user_op = wrap_operator("map", Vec::new(), |_input: FakeStream| FakeStream::new());
    let source_instance = source.attachment().instance().expect("attached");
    let plumbing = plumbing_op(source);
    set_internal(&plumbing, true);
    let plumbing_instance = plumbing.attachment().instance().expect("attached");
    let derived = user_op(plumbing);
    let derived_instance = derived.attachment().instance().expect("attached");

    let neighbors = graph::visible_neighbors(
        engine.recorder(),
        TargetRef::Instance(derived_instance),
        graph::Direction::Sources,
    );
    assert_eq!(
        neighbors,
        vec![TargetRef::Instance(source_instance)],
        "internal stage is skipped"
    );
    assert!(!neighbors.contains(&TargetRef::Instance(plumbing_instance)));
}

#[test]
fn nested_subscribe_inside_delivery_routes_to_the_outer_target() {
    let engine = install_test_engine();

    let outer = wrap_creator("outer", Vec::new(), FakeStream::new);
    let inner = wrap_creator("inner", Vec::new(), FakeStream::new);
    let outer_instance = outer.attachment().instance().expect("attached");
    let inner_instance = inner.attachment().instance().expect("attached");

    // As if a delivery on `outer` triggered the inner subscribe.
    skein_tracer::run(
        Trace::new(None, Some(TargetRef::Instance(outer_instance))),
        || {
            wrap_subscribe(
                &inner,
                SubscribeArgs::Callbacks {
                    next: None,
                    error: None,
                    complete: None,
                },
                |subscriber: Box<dyn SubscriberLike<i32>>| drop(subscriber),
            )
        },
    );

    let subscription = engine.recorder().instance_subscriptions(inner_instance)[0];
    assert_eq!(
        engine.recorder().subscription_destination(subscription),
        Some(crate::Destination::Instance(outer_instance))
    );
}
