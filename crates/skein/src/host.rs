//! Traits the host library's objects implement so the instrumentation layer
//! can wrap them without knowing the concrete library.

use crate::Attached;
use std::error::Error;
use std::rc::Rc;

/// Error payload carried by `error` emissions. `Rc` because execution is
/// single-threaded and one error fans out to many observers.
pub type DynError = Rc<dyn Error>;

/// The emission surface. Methods are `#[track_caller]` so emission locations
/// survive dynamic dispatch.
pub trait Observer<T> {
    #[track_caller]
    fn next(&mut self, value: T);
    #[track_caller]
    fn error(&mut self, error: DynError);
    #[track_caller]
    fn complete(&mut self);
}

/// A subscriber: an observer that can also be torn down and asked whether it
/// still accepts emissions. Calls on a closed subscriber must behave exactly
/// as the host defines; the instrumentation layer forwards them unrecorded.
pub trait SubscriberLike<T>: Observer<T> {
    #[track_caller]
    fn unsubscribe(&mut self);
    fn closed(&self) -> bool;
}

/// A subscriber that also carries a graph attachment. Passing one as the
/// observer of a subscribe call makes it (when attached) the subscription's
/// destination; subjects are the usual case.
pub trait AttachedSubscriber<T>: SubscriberLike<T> + Attached {}

impl<T, S: SubscriberLike<T> + Attached> AttachedSubscriber<T> for S {}

/// A multicast subject: an observer with a graph attachment of its own.
pub trait SubjectLike<T>: Observer<T> + Attached {
    fn closed(&self) -> bool;
}
