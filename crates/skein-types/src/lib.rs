//! Core graph nomenclature used across skein's recorded model.
//!
//! - `Declaration`: a call site that brought something into existence (a
//!   constructor, creator, operator, subscribe, or emission invocation).
//! - `StreamInstance`: a live observable-like value, owned by a declaration
//!   and possibly derived from another instance.
//! - `Subscription`: a subscriber attached to an instance, optionally
//!   forwarding to a destination.
//! - `Event`: a point-in-time occurrence on an instance or subscription,
//!   linked to its causal parent and children.
//! - `AsyncTaskUnit`: the timer/microtask/callback batch an event happened in.
//!
//! In short: declarations produce instances, instances hold subscriptions,
//! events happen to both, and task units say *when* in the host's scheduling
//! an event happened.

use facet::Facet;
use std::error::Error;
use std::fmt;

mod locations;
mod records;

pub use locations::*;
pub use records::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantError {
    ZeroId(&'static str),
    EmptyField(&'static str),
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroId(field) => write!(f, "{field} must be non-zero"),
            Self::EmptyField(field) => write!(f, "{field} must be non-empty"),
        }
    }
}

impl Error for InvariantError {}

macro_rules! define_u64_id {
    (
        $(#[$meta:meta])*
        $name:ident,
        field = $field:literal
    ) => {
        #[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[facet(transparent)]
        $(#[$meta])*
        pub struct $name(u64);

        impl $name {
            pub fn new(value: u64) -> Result<Self, InvariantError> {
                if value == 0 {
                    return Err(InvariantError::ZeroId($field));
                }
                Ok(Self(value))
            }

            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_u64_id!(
    /// Identity of a [`Declaration`]. Strictly increasing per recorder.
    DeclarationId,
    field = "declaration_id"
);
define_u64_id!(
    /// Identity of a [`StreamInstance`]. Strictly increasing per recorder.
    InstanceId,
    field = "instance_id"
);
define_u64_id!(
    /// Identity of a [`Subscription`]. Strictly increasing per recorder.
    SubscriptionId,
    field = "subscription_id"
);
define_u64_id!(
    /// Identity of an [`Event`]. Doubles as the event's logical time: the
    /// sequence is the total order of every event the recorder ever saw.
    EventId,
    field = "event_id"
);
define_u64_id!(
    /// Identity of an [`AsyncTaskUnit`].
    TaskUnitId,
    field = "task_unit_id"
);
