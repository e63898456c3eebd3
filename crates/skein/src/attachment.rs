//! The hidden attachment associating live host objects with graph records.

use skein_recorder::{InstanceRef, TargetRef};
use std::cell::OnceCell;
use std::fmt;

/// Write-once slot a host object embeds to point back at its graph record.
///
/// Attaching twice is a programming error and panics: at that point the host
/// environment is already inconsistent and a silently wrong graph would be
/// worse than a crash.
#[derive(Default)]
pub struct AttachmentSlot {
    slot: OnceCell<TargetRef>,
}

impl AttachmentSlot {
    pub const fn new() -> Self {
        Self {
            slot: OnceCell::new(),
        }
    }

    pub fn attach(&self, target: TargetRef) {
        if self.slot.set(target).is_err() {
            panic!("invariant violated: object already carries a graph attachment");
        }
    }

    pub fn get(&self) -> Option<TargetRef> {
        self.slot.get().copied()
    }

    /// The attached instance, if the attachment is an instance ref.
    pub fn instance(&self) -> Option<InstanceRef> {
        match self.get() {
            Some(TargetRef::Instance(instance)) => Some(instance),
            _ => None,
        }
    }
}

impl fmt::Debug for AttachmentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(target) => write!(f, "AttachmentSlot({target:?})"),
            None => write!(f, "AttachmentSlot(empty)"),
        }
    }
}

/// Implemented by host objects that embed an [`AttachmentSlot`].
pub trait Attached {
    fn attachment(&self) -> &AttachmentSlot;
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_recorder::Recorder;

    fn some_target(recorder: &Recorder) -> TargetRef {
        let declaration = recorder.declare("source$", None, None);
        TargetRef::Instance(recorder.instance(declaration, None))
    }

    #[test]
    fn attach_once_then_read() {
        let recorder = Recorder::new();
        let slot = AttachmentSlot::new();
        assert_eq!(slot.get(), None);

        let target = some_target(&recorder);
        slot.attach(target);
        assert_eq!(slot.get(), Some(target));
        assert!(slot.instance().is_some());
    }

    #[test]
    #[should_panic(expected = "invariant violated")]
    fn double_attach_panics() {
        let recorder = Recorder::new();
        let slot = AttachmentSlot::new();
        slot.attach(some_target(&recorder));
        slot.attach(some_target(&recorder));
    }
}
