//! Shared vocabulary used across the shadow index, scanner, queue, and monitor.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The closed set of canonical event kinds the engine can dispatch to a
/// consumer callback. `Modified` covers both content modification and
/// attribute/metadata change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanonicalEventKind {
    Created,
    Modified,
    Deleted,
    MonitoredDirMoved,
    DroppedEvents,
}

/// Free-form label identifying the back-end that discovered an event, for
/// diagnostics (e.g. `"inotify"`, `"reconciliation"`).
pub type SourceTag = &'static str;

pub const SOURCE_RECONCILIATION: SourceTag = "reconciliation";
pub const SOURCE_LIVE: SourceTag = "notify";

/// One row of the durable Shadow Index: `(root, parent_dir, name, mtime)`.
/// Regular files store integer mtime seconds; directories store `-1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowRow {
    pub root: String,
    pub parent_dir: String,
    pub name: String,
    pub mtime: i64,
}

impl ShadowRow {
    pub const DIR_MTIME: i64 = -1;

    pub fn is_dir(&self) -> bool {
        self.mtime == Self::DIR_MTIME
    }

    /// Full path this row represents.
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.parent_dir).join(&self.name)
    }
}

/// Key used to delete/update a single Shadow Index row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShadowKey {
    pub parent_dir: String,
    pub name: String,
}

/// Result of diffing a live subtree against the Shadow Index snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub created: Vec<ShadowRow>,
    pub modified: Vec<ShadowRow>,
    pub deleted: Vec<ShadowKey>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}
