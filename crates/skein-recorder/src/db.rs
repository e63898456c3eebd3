//! Central locked store behind a [`crate::Recorder`].
//!
//! `BTreeMap` keyed by id so snapshots iterate deterministically. Records are
//! never removed: refs stay dereferenceable for the life of the recorder.

use skein_types::{
    AsyncTaskUnit, Declaration, DeclarationId, Event, EventId, GraphSnapshot, InstanceId,
    StreamInstance, Subscription, SubscriptionId, TaskUnitId,
};
use std::collections::BTreeMap;

pub(crate) struct GraphDb {
    pub(crate) declarations: BTreeMap<DeclarationId, Declaration>,
    pub(crate) instances: BTreeMap<InstanceId, StreamInstance>,
    pub(crate) subscriptions: BTreeMap<SubscriptionId, Subscription>,
    pub(crate) events: BTreeMap<EventId, Event>,
    pub(crate) task_units: BTreeMap<TaskUnitId, AsyncTaskUnit>,

    next_declaration: u64,
    next_instance: u64,
    next_subscription: u64,
    next_event: u64,
    next_task_unit: u64,

    /// Explicitly started task units, innermost last.
    pub(crate) task_stack: Vec<TaskUnitId>,
    /// Lazily created "main" unit, live until the batch ends.
    pub(crate) implicit_task: Option<TaskUnitId>,
}

impl GraphDb {
    pub(crate) fn new() -> Self {
        Self {
            declarations: BTreeMap::new(),
            instances: BTreeMap::new(),
            subscriptions: BTreeMap::new(),
            events: BTreeMap::new(),
            task_units: BTreeMap::new(),
            next_declaration: 0,
            next_instance: 0,
            next_subscription: 0,
            next_event: 0,
            next_task_unit: 0,
            task_stack: Vec::new(),
            implicit_task: None,
        }
    }

    pub(crate) fn alloc_declaration_id(&mut self) -> DeclarationId {
        self.next_declaration += 1;
        DeclarationId::new(self.next_declaration).expect("counter starts at 1")
    }

    pub(crate) fn alloc_instance_id(&mut self) -> InstanceId {
        self.next_instance += 1;
        InstanceId::new(self.next_instance).expect("counter starts at 1")
    }

    pub(crate) fn alloc_subscription_id(&mut self) -> SubscriptionId {
        self.next_subscription += 1;
        SubscriptionId::new(self.next_subscription).expect("counter starts at 1")
    }

    pub(crate) fn alloc_event_id(&mut self) -> EventId {
        self.next_event += 1;
        EventId::new(self.next_event).expect("counter starts at 1")
    }

    pub(crate) fn alloc_task_unit_id(&mut self) -> TaskUnitId {
        self.next_task_unit += 1;
        TaskUnitId::new(self.next_task_unit).expect("counter starts at 1")
    }

    pub(crate) fn declaration(&self, id: DeclarationId) -> &Declaration {
        self.declarations
            .get(&id)
            .unwrap_or_else(|| missing("declaration", id.get()))
    }

    pub(crate) fn declaration_mut(&mut self, id: DeclarationId) -> &mut Declaration {
        self.declarations
            .get_mut(&id)
            .unwrap_or_else(|| missing("declaration", id.get()))
    }

    pub(crate) fn instance(&self, id: InstanceId) -> &StreamInstance {
        self.instances
            .get(&id)
            .unwrap_or_else(|| missing("instance", id.get()))
    }

    pub(crate) fn instance_mut(&mut self, id: InstanceId) -> &mut StreamInstance {
        self.instances
            .get_mut(&id)
            .unwrap_or_else(|| missing("instance", id.get()))
    }

    pub(crate) fn subscription(&self, id: SubscriptionId) -> &Subscription {
        self.subscriptions
            .get(&id)
            .unwrap_or_else(|| missing("subscription", id.get()))
    }

    pub(crate) fn subscription_mut(&mut self, id: SubscriptionId) -> &mut Subscription {
        self.subscriptions
            .get_mut(&id)
            .unwrap_or_else(|| missing("subscription", id.get()))
    }

    pub(crate) fn event(&self, id: EventId) -> &Event {
        self.events
            .get(&id)
            .unwrap_or_else(|| missing("event", id.get()))
    }

    pub(crate) fn event_mut(&mut self, id: EventId) -> &mut Event {
        self.events
            .get_mut(&id)
            .unwrap_or_else(|| missing("event", id.get()))
    }

    pub(crate) fn task_unit(&self, id: TaskUnitId) -> &AsyncTaskUnit {
        self.task_units
            .get(&id)
            .unwrap_or_else(|| missing("task unit", id.get()))
    }

    pub(crate) fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            declarations: self.declarations.values().cloned().collect(),
            instances: self.instances.values().cloned().collect(),
            subscriptions: self.subscriptions.values().cloned().collect(),
            events: self.events.values().cloned().collect(),
            task_units: self.task_units.values().cloned().collect(),
        }
    }
}

/// A ref whose record is absent can only come from another recorder or a
/// bug in the instrumentation layer. Fail fast rather than hand back a
/// partial object.
pub(crate) fn missing(kind: &'static str, id: u64) -> ! {
    panic!("invariant violated: {kind} ref #{id} has no record in this recorder")
}
