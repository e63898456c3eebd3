//! The recorder builds and owns the causal graph.
//!
//! Everything else holds opaque, type-tagged refs: a ref stands for exactly
//! one record, can only be minted here, and dereferences through the
//! recorder. Records are never removed, so a ref handed out once stays valid
//! for the recorder's lifetime; dereferencing a ref minted by a *different*
//! recorder is a programming error and panics.
//!
//! The recorder also tracks the "current async task unit": the timer or
//! callback batch events are attributed to. If recording happens with no
//! explicitly started unit, an implicit `"main"` unit is created lazily and
//! lives until [`Recorder::end_batch`] tears it down.

use parking_lot::Mutex;
use skein_types::{
    AsyncTaskUnit, Callsite, Declaration, DeclarationId, DestinationId, Event, EventId,
    EventKind, EventTargetId, GraphSnapshot, InstanceId, LocationsPromise, ObserverForm,
    StreamInstance, Subscription, SubscriptionId, TaskUnitId, WallMs,
};
use std::sync::Arc;
use tracing::warn;

mod db;

use db::GraphDb;

// ── Opaque refs ─────────────────────────────────────────────────

macro_rules! define_ref {
    (
        $(#[$meta:meta])*
        $name:ident($id:ident)
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name($id);

        impl $name {
            /// The underlying identity, for display and snapshot correlation.
            pub fn id(self) -> $id {
                self.0
            }
        }
    };
}

define_ref!(
    /// Handle to a [`Declaration`] record.
    DeclarationRef(DeclarationId)
);
define_ref!(
    /// Handle to a [`StreamInstance`] record.
    InstanceRef(InstanceId)
);
define_ref!(
    /// Handle to a [`Subscription`] record.
    SubscriptionRef(SubscriptionId)
);
define_ref!(
    /// Handle to an [`Event`] record.
    EventRef(EventId)
);
define_ref!(
    /// Handle to an [`AsyncTaskUnit`] record.
    TaskUnitRef(TaskUnitId)
);

/// An event target: the instance or subscription an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetRef {
    Instance(InstanceRef),
    Subscription(SubscriptionRef),
}

impl TargetRef {
    fn target_id(self) -> EventTargetId {
        match self {
            Self::Instance(instance) => EventTargetId::Instance(instance.id()),
            Self::Subscription(subscription) => {
                EventTargetId::Subscription(subscription.id())
            }
        }
    }
}

impl From<InstanceRef> for TargetRef {
    fn from(instance: InstanceRef) -> Self {
        Self::Instance(instance)
    }
}

impl From<SubscriptionRef> for TargetRef {
    fn from(subscription: SubscriptionRef) -> Self {
        Self::Subscription(subscription)
    }
}

/// Where a subscription forwards to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Instance(InstanceRef),
    Subscription(SubscriptionRef),
    /// A plain calling function with no graph presence of its own.
    Caller(String),
}

impl Destination {
    fn destination_id(&self) -> DestinationId {
        match self {
            Self::Instance(instance) => DestinationId::Instance(instance.id()),
            Self::Subscription(subscription) => {
                DestinationId::Subscription(subscription.id())
            }
            Self::Caller(label) => DestinationId::Caller(label.clone()),
        }
    }

    /// The destination as an event target, if it has one.
    pub fn target(&self) -> Option<TargetRef> {
        match self {
            Self::Instance(instance) => Some(TargetRef::Instance(*instance)),
            Self::Subscription(subscription) => {
                Some(TargetRef::Subscription(*subscription))
            }
            Self::Caller(_) => None,
        }
    }
}

impl From<TargetRef> for Destination {
    fn from(target: TargetRef) -> Self {
        match target {
            TargetRef::Instance(instance) => Self::Instance(instance),
            TargetRef::Subscription(subscription) => Self::Subscription(subscription),
        }
    }
}

// ── Recorder ────────────────────────────────────────────────────

/// Shared handle to the graph store. Cheap to clone.
#[derive(Clone)]
pub struct Recorder {
    db: Arc<Mutex<GraphDb>>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            db: Arc::new(Mutex::new(GraphDb::new())),
        }
    }

    // ── Creation ────────────────────────────────────────────

    /// Allocates a declaration. If a locations promise is supplied, a
    /// continuation patches the record when the promise resolves; until then
    /// the record's locations read as `None`.
    pub fn declare(
        &self,
        name: &str,
        callsite: Option<Callsite>,
        locations: Option<LocationsPromise>,
    ) -> DeclarationRef {
        let initial = locations.as_ref().and_then(|promise| promise.peek());
        let already_resolved = initial.is_some();
        let id = {
            let mut db = self.db.lock();
            let id = db.alloc_declaration_id();
            db.declarations.insert(
                id,
                Declaration {
                    id,
                    name: name.to_string(),
                    callsite,
                    locations: initial,
                    internal: false,
                    tags: Vec::new(),
                },
            );
            id
        };
        // Install the continuation outside the lock: a provider resolving
        // synchronously would otherwise re-enter the store.
        if let Some(promise) = locations {
            if !already_resolved {
                let db = Arc::clone(&self.db);
                promise.on_resolve(move |resolved| {
                    db.lock().declaration_mut(id).locations = Some(resolved.clone());
                });
            }
        }
        DeclarationRef(id)
    }

    /// Allocates a stream instance. Attaching the ref to the live runtime
    /// object is the instrumentation layer's job, so this stays testable
    /// without real host objects.
    pub fn instance(
        &self,
        declaration: DeclarationRef,
        source: Option<InstanceRef>,
    ) -> InstanceRef {
        let mut db = self.db.lock();
        // Validate the inputs belong to this recorder before allocating.
        db.declaration(declaration.id());
        if let Some(source) = source {
            db.instance(source.id());
        }
        let id = db.alloc_instance_id();
        db.instances.insert(
            id,
            StreamInstance {
                id,
                declaration: declaration.id(),
                source: source.map(InstanceRef::id),
                subscriptions: Vec::new(),
                events: Vec::new(),
                internal: false,
                tags: Vec::new(),
            },
        );
        InstanceRef(id)
    }

    /// Allocates a subscription and appends it to the owning instance.
    pub fn subscription(
        &self,
        observer_form: ObserverForm,
        instance: InstanceRef,
        destination: Option<Destination>,
    ) -> SubscriptionRef {
        let mut db = self.db.lock();
        let id = db.alloc_subscription_id();
        db.instance_mut(instance.id()).subscriptions.push(id);
        db.subscriptions.insert(
            id,
            Subscription {
                id,
                instance: instance.id(),
                destination: destination.as_ref().map(Destination::destination_id),
                observer_form,
                events: Vec::new(),
            },
        );
        SubscriptionRef(id)
    }

    /// Allocates an event on an instance.
    pub fn instance_event(
        &self,
        kind: EventKind,
        declaration: DeclarationRef,
        instance: InstanceRef,
        source_event: Option<EventRef>,
    ) -> EventRef {
        self.record_event(kind, declaration, TargetRef::Instance(instance), source_event)
    }

    /// Allocates an event on a subscription.
    pub fn subscription_event(
        &self,
        kind: EventKind,
        declaration: DeclarationRef,
        subscription: SubscriptionRef,
        source_event: Option<EventRef>,
    ) -> EventRef {
        self.record_event(
            kind,
            declaration,
            TargetRef::Subscription(subscription),
            source_event,
        )
    }

    /// One atomic step under the store lock: allocate the event, append it to
    /// the target's event list, and link both directions of the causal edge.
    fn record_event(
        &self,
        kind: EventKind,
        declaration: DeclarationRef,
        target: TargetRef,
        source_event: Option<EventRef>,
    ) -> EventRef {
        let mut db = self.db.lock();
        db.declaration(declaration.id());
        let task = current_task_locked(&mut db);
        let id = db.alloc_event_id();
        match target {
            TargetRef::Instance(instance) => {
                db.instance_mut(instance.id()).events.push(id);
            }
            TargetRef::Subscription(subscription) => {
                db.subscription_mut(subscription.id()).events.push(id);
            }
        }
        if let Some(source) = source_event {
            db.event_mut(source.id()).succeeding.push(id);
        }
        db.events.insert(
            id,
            Event {
                id,
                at: WallMs::now(),
                kind,
                declaration: declaration.id(),
                target: target.target_id(),
                task,
                preceding: source_event.map(EventRef::id),
                succeeding: Vec::new(),
            },
        );
        EventRef(id)
    }

    // ── Tagging ─────────────────────────────────────────────

    pub fn add_tag(&self, instance: InstanceRef, tag: &str) {
        self.db
            .lock()
            .instance_mut(instance.id())
            .tags
            .push(tag.to_string());
    }

    pub fn set_internal(&self, instance: InstanceRef, internal: bool) {
        self.db.lock().instance_mut(instance.id()).internal = internal;
    }

    pub fn set_declaration_internal(&self, declaration: DeclarationRef, internal: bool) {
        self.db.lock().declaration_mut(declaration.id()).internal = internal;
    }

    // ── Async task units ────────────────────────────────────

    /// Opens an explicit task unit; events record into it until `end_task`.
    pub fn start_task(&self, name: &str) -> TaskUnitRef {
        let mut db = self.db.lock();
        let id = db.alloc_task_unit_id();
        db.task_units.insert(
            id,
            AsyncTaskUnit {
                id,
                name: name.to_string(),
            },
        );
        db.task_stack.push(id);
        TaskUnitRef(id)
    }

    /// Closes the innermost explicit task unit. Defensive: with none open
    /// this is a logged no-op, not a failure.
    pub fn end_task(&self) {
        let mut db = self.db.lock();
        if db.task_stack.pop().is_none() {
            warn!("end_task called with no active task unit");
        }
    }

    /// Opens a task unit that closes when the returned scope drops, on every
    /// exit path.
    pub fn task_scope(&self, name: &str) -> TaskScope {
        let unit = self.start_task(name);
        TaskScope {
            recorder: self.clone(),
            unit,
        }
    }

    /// The unit events currently record into, creating the implicit `"main"`
    /// unit if nothing is open.
    pub fn current_task(&self) -> TaskUnitRef {
        let mut db = self.db.lock();
        TaskUnitRef(current_task_locked(&mut db))
    }

    /// Ends the current synchronous+microtask batch: tears down the implicit
    /// unit so the next unattributed work gets a fresh one.
    pub fn end_batch(&self) {
        self.db.lock().implicit_task = None;
    }

    // ── Deref ───────────────────────────────────────────────

    pub fn declaration_record(&self, declaration: DeclarationRef) -> Declaration {
        self.db.lock().declaration(declaration.id()).clone()
    }

    pub fn instance_record(&self, instance: InstanceRef) -> StreamInstance {
        self.db.lock().instance(instance.id()).clone()
    }

    pub fn subscription_record(&self, subscription: SubscriptionRef) -> Subscription {
        self.db.lock().subscription(subscription.id()).clone()
    }

    pub fn event_record(&self, event: EventRef) -> Event {
        self.db.lock().event(event.id()).clone()
    }

    pub fn task_unit_record(&self, unit: TaskUnitRef) -> AsyncTaskUnit {
        self.db.lock().task_unit(unit.id()).clone()
    }

    // ── Ref-level graph accessors ───────────────────────────

    pub fn instance_declaration(&self, instance: InstanceRef) -> DeclarationRef {
        DeclarationRef(self.db.lock().instance(instance.id()).declaration)
    }

    pub fn instance_source(&self, instance: InstanceRef) -> Option<InstanceRef> {
        self.db.lock().instance(instance.id()).source.map(InstanceRef)
    }

    pub fn instance_subscriptions(&self, instance: InstanceRef) -> Vec<SubscriptionRef> {
        self.db
            .lock()
            .instance(instance.id())
            .subscriptions
            .iter()
            .copied()
            .map(SubscriptionRef)
            .collect()
    }

    pub fn subscription_instance(&self, subscription: SubscriptionRef) -> InstanceRef {
        InstanceRef(self.db.lock().subscription(subscription.id()).instance)
    }

    pub fn subscription_destination(
        &self,
        subscription: SubscriptionRef,
    ) -> Option<Destination> {
        let db = self.db.lock();
        db.subscription(subscription.id())
            .destination
            .as_ref()
            .map(|destination| match destination {
                DestinationId::Instance(id) => Destination::Instance(InstanceRef(*id)),
                DestinationId::Subscription(id) => {
                    Destination::Subscription(SubscriptionRef(*id))
                }
                DestinationId::Caller(label) => Destination::Caller(label.clone()),
            })
    }

    pub fn target_events(&self, target: TargetRef) -> Vec<EventRef> {
        let db = self.db.lock();
        let ids = match target {
            TargetRef::Instance(instance) => &db.instance(instance.id()).events,
            TargetRef::Subscription(subscription) => {
                &db.subscription(subscription.id()).events
            }
        };
        ids.iter().copied().map(EventRef).collect()
    }

    pub fn event_target(&self, event: EventRef) -> TargetRef {
        match self.db.lock().event(event.id()).target {
            EventTargetId::Instance(id) => TargetRef::Instance(InstanceRef(id)),
            EventTargetId::Subscription(id) => {
                TargetRef::Subscription(SubscriptionRef(id))
            }
        }
    }

    pub fn event_preceding(&self, event: EventRef) -> Option<EventRef> {
        self.db.lock().event(event.id()).preceding.map(EventRef)
    }

    pub fn event_succeeding(&self, event: EventRef) -> Vec<EventRef> {
        self.db
            .lock()
            .event(event.id())
            .succeeding
            .iter()
            .copied()
            .map(EventRef)
            .collect()
    }

    pub fn event_task(&self, event: EventRef) -> TaskUnitRef {
        TaskUnitRef(self.db.lock().event(event.id()).task)
    }

    /// Whether a target should be elided from user-facing views: an instance
    /// flagged internal (directly or via its declaration), or a subscription
    /// on such an instance.
    pub fn is_internal(&self, target: TargetRef) -> bool {
        let db = self.db.lock();
        let instance_id = match target {
            TargetRef::Instance(instance) => instance.id(),
            TargetRef::Subscription(subscription) => {
                db.subscription(subscription.id()).instance
            }
        };
        let instance = db.instance(instance_id);
        instance.internal || db.declaration(instance.declaration).internal
    }

    // ── Export ──────────────────────────────────────────────

    pub fn event_count(&self) -> usize {
        self.db.lock().events.len()
    }

    /// A full copy of the graph for the UI/RPC layer.
    pub fn snapshot(&self) -> GraphSnapshot {
        self.db.lock().snapshot()
    }
}

fn current_task_locked(db: &mut GraphDb) -> TaskUnitId {
    if let Some(top) = db.task_stack.last() {
        return *top;
    }
    if let Some(implicit) = db.implicit_task {
        return implicit;
    }
    let id = db.alloc_task_unit_id();
    db.task_units.insert(
        id,
        AsyncTaskUnit {
            id,
            name: "main".to_string(),
        },
    );
    db.implicit_task = Some(id);
    id
}

/// Guard that closes its task unit on drop.
pub struct TaskScope {
    recorder: Recorder,
    unit: TaskUnitRef,
}

impl TaskScope {
    pub fn unit(&self) -> TaskUnitRef {
        self.unit
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        self.recorder.end_task();
    }
}
