//! Record structs stored in the recorder's graph.
//!
//! These are plain data: all mutation goes through the recorder, and the
//! whole set can be copied out as a [`GraphSnapshot`] for a UI/RPC layer.
//! Records reference each other by raw id; the opaque refs callers hold live
//! in the recorder crate.

use crate::{DeclarationId, DeclarationLocations, EventId, InstanceId, SubscriptionId, TaskUnitId};
use facet::Facet;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock timestamp in milliseconds since the Unix epoch.
///
/// Ordering across events is carried by [`EventId`], not this: wall clocks
/// can tie or step backwards within a burst.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq)]
#[facet(transparent)]
pub struct WallMs(u64);

impl WallMs {
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since| since.as_millis().min(u64::MAX as u128) as u64)
            .unwrap_or(0);
        Self(ms)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Causal kind of an [`Event`].
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum EventKind {
    Subscribe,
    Unsubscribe,
    Next,
    Error,
    Complete,
}

impl EventKind {
    /// Declaration name conventionally used for events of this kind.
    pub fn label(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Next => "next",
            Self::Error => "error",
            Self::Complete => "complete",
        }
    }
}

/// Which observer form a subscribe call used. Kept on the subscription so
/// downstream consumers can distinguish forms even after normalization.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum ObserverForm {
    /// Up to three positional callbacks (`next`, `error`, `complete`).
    Callbacks {
        has_next: bool,
        has_error: bool,
        has_complete: bool,
    },
    /// An object implementing some of the observer surface.
    Partial,
    /// A full observer object.
    Full,
    /// A subject passed directly as the observer.
    Subject,
}

/// What an event happened to.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum EventTargetId {
    Instance(InstanceId),
    Subscription(SubscriptionId),
}

/// Where a subscription forwards its emissions.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum DestinationId {
    Instance(InstanceId),
    Subscription(SubscriptionId),
    /// A plain calling function, identified only by a label the adapter chose.
    Caller(String),
}

/// The invoked function and its (pre-rendered) arguments.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct Callsite {
    pub function: String,
    pub args: Vec<String>,
}

/// A call site that produced a graph record: constructor, creator, operator,
/// subscribe, or emission invocation. Created once per invocation, never
/// destroyed.
#[derive(Facet, Debug, Clone)]
pub struct Declaration {
    pub id: DeclarationId,
    /// Human-readable name, e.g. `"interval"` or `"next"`.
    pub name: String,
    pub callsite: Option<Callsite>,
    /// Filled in asynchronously by the location provider; readers must
    /// tolerate `None`.
    pub locations: Option<DeclarationLocations>,
    /// Library plumbing, elided from user-facing views.
    pub internal: bool,
    pub tags: Vec<String>,
}

/// A live observable-like value.
#[derive(Facet, Debug, Clone)]
pub struct StreamInstance {
    pub id: InstanceId,
    pub declaration: DeclarationId,
    /// The instance this one was derived from, e.g. by an operator.
    pub source: Option<InstanceId>,
    pub subscriptions: Vec<SubscriptionId>,
    pub events: Vec<EventId>,
    pub internal: bool,
    pub tags: Vec<String>,
}

/// A subscriber attached to an instance.
///
/// `destination` may name the subscription's own instance (a subject
/// re-subscribed to itself): the model does not assume acyclicity.
#[derive(Facet, Debug, Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub instance: InstanceId,
    /// Absent for a top-level subscription.
    pub destination: Option<DestinationId>,
    pub observer_form: ObserverForm,
    pub events: Vec<EventId>,
}

/// A point-in-time occurrence. Immutable once created, except that later
/// events append themselves to `succeeding`.
#[derive(Facet, Debug, Clone)]
pub struct Event {
    pub id: EventId,
    pub at: WallMs,
    pub kind: EventKind,
    /// The declaration describing the call that produced this event.
    pub declaration: DeclarationId,
    pub target: EventTargetId,
    /// The async task unit the event occurred within.
    pub task: TaskUnitId,
    /// Causal parent. Mutually consistent with the parent's `succeeding`.
    pub preceding: Option<EventId>,
    /// Causal children, in creation order.
    pub succeeding: Vec<EventId>,
}

/// One timer/microtask/callback batch of host scheduling.
#[derive(Facet, Debug, Clone)]
pub struct AsyncTaskUnit {
    pub id: TaskUnitId,
    /// Descriptive name, e.g. `"interval 100ms"` or `"main"`.
    pub name: String,
}

/// A full copy of the recorded graph, ordered by id within each kind.
#[derive(Facet, Debug, Clone, Default)]
pub struct GraphSnapshot {
    pub declarations: Vec<Declaration>,
    pub instances: Vec<StreamInstance>,
    pub subscriptions: Vec<Subscription>,
    pub events: Vec<Event>,
    pub task_units: Vec<AsyncTaskUnit>,
}
