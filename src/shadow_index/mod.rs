//! Durable mapping `(root, parent_dir, name) -> mtime` per monitored root.
//!
//! Each bulk call is atomic (all-or-nothing) and durable on return;
//! concurrent callers are serialized by the underlying store.

pub mod sqlite;

pub use sqlite::SqliteShadowIndexStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ShadowKey, ShadowRow};

/// Repository for the per-root durable snapshot used to reconstruct
/// offline-gap events.
#[async_trait]
pub trait ShadowIndexStore: Send + Sync {
    /// Bulk insert. Rows already present (same `(root, parent_dir, name)`)
    /// are left unchanged.
    async fn add_files(&self, rows: &[ShadowRow]) -> Result<()>;

    /// Bulk upsert of `mtime`.
    async fn update_files(&self, rows: &[ShadowRow]) -> Result<()>;

    /// Bulk delete by `(parent_dir, name)`.
    async fn delete_files(&self, root: &str, keys: &[ShadowKey]) -> Result<()>;

    /// Enumerate all rows under a root.
    async fn list_subtree(&self, root: &str) -> Result<Vec<ShadowRow>>;

    /// `true` if the Shadow Index has no rows for `root` yet.
    async fn is_empty(&self, root: &str) -> Result<bool> {
        Ok(self.list_subtree(root).await?.is_empty())
    }
}
