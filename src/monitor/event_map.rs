//! Translation between canonical event kinds and the event kinds `notify`
//! reports.
//!
//! `classify` is the reverse (notify -> canonical) mapping the dispatcher
//! runs per event. [`is_rename`] is a narrower predicate the dispatcher
//! consults first: a rename/move notification whose path is the watched
//! root itself is `MonitoredDirMoved`, not a `Created`/`Deleted` pair, and
//! `classify` alone has no way to tell the two apart.

use notify::event::{EventKind as NotifyEventKind, ModifyKind, RemoveKind, RenameMode};

use crate::types::CanonicalEventKind;

/// Maps a raw `notify::Event` kind to its canonical counterpart.
/// `Modified` absorbs both content (`Data`) and metadata (`Metadata`)
/// changes, per spec §3.
pub fn classify(kind: &NotifyEventKind) -> Option<CanonicalEventKind> {
    match kind {
        NotifyEventKind::Create(_) => Some(CanonicalEventKind::Created),
        NotifyEventKind::Modify(ModifyKind::Data(_) | ModifyKind::Metadata(_)) => {
            Some(CanonicalEventKind::Modified)
        }
        NotifyEventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            Some(CanonicalEventKind::Deleted)
        }
        NotifyEventKind::Modify(ModifyKind::Name(_)) => Some(CanonicalEventKind::Created),
        NotifyEventKind::Remove(RemoveKind::File | RemoveKind::Folder | RemoveKind::Any) => {
            Some(CanonicalEventKind::Deleted)
        }
        NotifyEventKind::Other => Some(CanonicalEventKind::DroppedEvents),
        _ => None,
    }
}

/// `true` if `kind` is a rename/move notification. Used by the dispatcher to
/// tell a watched root moving out from under itself (`MonitoredDirMoved`)
/// apart from an ordinary descendant rename, which `classify` alone cannot
/// distinguish since both arrive as `Modify(Name(_))`.
pub fn is_rename(kind: &NotifyEventKind) -> bool {
    matches!(kind, NotifyEventKind::Modify(ModifyKind::Name(_)))
}
