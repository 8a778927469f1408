//! Walks a subtree, diffs it against the Shadow Index, and returns the sets
//! of created / modified / deleted entries. Drives both the initial scan and
//! the offline-gap reconciliation.

pub mod fs;

pub use fs::{FileSystem, FsMetadata};

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;
use crate::shadow_index::ShadowIndexStore;
use crate::types::{DiffResult, ShadowKey, ShadowRow};

/// Walks a subtree and compares it against a Shadow Index snapshot.
pub struct PathScanner<F: FileSystem> {
    fs: F,
}

impl<F: FileSystem> PathScanner<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    /// If the Shadow Index is empty for `root`, walk the subtree and insert
    /// every file and directory. If non-empty, return immediately.
    /// No events are emitted by this operation.
    pub async fn initial_scan(&self, store: &dyn ShadowIndexStore, root: &Path) -> Result<()> {
        let root_key = root.to_string_lossy().to_string();
        if !store.is_empty(&root_key).await? {
            return Ok(());
        }

        let entries = self.walk(root).await;
        if entries.is_empty() {
            return Ok(());
        }

        let rows: Vec<ShadowRow> = entries
            .into_iter()
            .map(|(path, meta)| to_row(&root_key, &path, &meta))
            .collect();
        store.add_files(&rows).await
    }

    /// Walk the live subtree, compare every entry to the Shadow Index
    /// snapshot for `root`, and produce the created/modified/deleted sets.
    /// Directory mtimes are compared against the `-1` sentinel, so
    /// directories never count as "modified".
    pub async fn diff_scan(&self, store: &dyn ShadowIndexStore, root: &Path) -> Result<DiffResult> {
        let root_key = root.to_string_lossy().to_string();

        let mut snapshot: HashMap<(String, String), i64> = HashMap::new();
        for row in store.list_subtree(&root_key).await? {
            snapshot.insert((row.parent_dir.clone(), row.name.clone()), row.mtime);
        }

        let live = self.walk(root).await;
        let mut live_keys: std::collections::HashSet<(String, String)> =
            std::collections::HashSet::with_capacity(live.len());

        let mut result = DiffResult::default();

        for (path, meta) in &live {
            let row = to_row(&root_key, path, meta);
            let key = (row.parent_dir.clone(), row.name.clone());
            live_keys.insert(key.clone());

            match snapshot.get(&key) {
                None => result.created.push(row),
                Some(&old_mtime) => {
                    if !row.is_dir() && row.mtime != old_mtime {
                        result.modified.push(row);
                    }
                }
            }
        }

        for (parent_dir, name) in snapshot.keys() {
            let key = (parent_dir.clone(), name.clone());
            if !live_keys.contains(&key) {
                result.deleted.push(ShadowKey {
                    parent_dir: parent_dir.clone(),
                    name: name.clone(),
                });
            }
        }

        Ok(result)
    }

    /// Apply a `DiffResult` to the Shadow Index, making subsequent
    /// `diff_scan` calls idempotent.
    pub async fn apply_diff(&self, store: &dyn ShadowIndexStore, root: &Path, diff: &DiffResult) -> Result<()> {
        let root_key = root.to_string_lossy().to_string();
        if !diff.created.is_empty() {
            store.add_files(&diff.created).await?;
        }
        if !diff.modified.is_empty() {
            store.update_files(&diff.modified).await?;
        }
        if !diff.deleted.is_empty() {
            store.delete_files(&root_key, &diff.deleted).await?;
        }
        Ok(())
    }

    /// Breadth-first walk of `root`. Symlinks are not followed. Unreadable
    /// subdirectories are logged and treated as absent (their previously
    /// indexed contents will surface as deletions on the next diff), rather
    /// than aborting the scan.
    async fn walk(&self, root: &Path) -> Vec<(PathBuf, FsMetadata)> {
        let mut out = Vec::new();
        let mut queue: VecDeque<PathBuf> = VecDeque::new();
        queue.push_back(root.to_path_buf());

        while let Some(dir) = queue.pop_front() {
            let children = match self.fs.read_dir(&dir).await {
                Ok(children) => children,
                Err(err) => {
                    warn!("unreadable subdirectory {}: {}", dir.display(), err);
                    continue;
                }
            };

            for child in children {
                let meta = match self.fs.symlink_metadata(&child).await {
                    Ok(meta) => meta,
                    Err(err) => {
                        warn!("could not stat {}: {}", child.display(), err);
                        continue;
                    }
                };

                out.push((child.clone(), meta));
                if meta.is_dir {
                    queue.push_back(child);
                }
            }
        }

        out
    }
}

fn to_row(root_key: &str, path: &Path, meta: &FsMetadata) -> ShadowRow {
    let parent_dir = path
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    ShadowRow {
        root: root_key.to_string(),
        parent_dir,
        name,
        mtime: if meta.is_dir {
            ShadowRow::DIR_MTIME
        } else {
            meta.mtime_secs.unwrap_or(0)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::fs::InMemoryFs;
    use crate::shadow_index::ShadowIndexStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemStore {
        rows: Mutex<Vec<ShadowRow>>,
    }

    #[async_trait]
    impl ShadowIndexStore for MemStore {
        async fn add_files(&self, rows: &[ShadowRow]) -> Result<()> {
            let mut guard = self.rows.lock().unwrap();
            for row in rows {
                let exists = guard
                    .iter()
                    .any(|r| r.root == row.root && r.parent_dir == row.parent_dir && r.name == row.name);
                if !exists {
                    guard.push(row.clone());
                }
            }
            Ok(())
        }

        async fn update_files(&self, rows: &[ShadowRow]) -> Result<()> {
            let mut guard = self.rows.lock().unwrap();
            for row in rows {
                if let Some(existing) = guard
                    .iter_mut()
                    .find(|r| r.root == row.root && r.parent_dir == row.parent_dir && r.name == row.name)
                {
                    existing.mtime = row.mtime;
                } else {
                    guard.push(row.clone());
                }
            }
            Ok(())
        }

        async fn delete_files(&self, root: &str, keys: &[ShadowKey]) -> Result<()> {
            let mut guard = self.rows.lock().unwrap();
            guard.retain(|r| {
                !(r.root == root
                    && keys
                        .iter()
                        .any(|k| k.parent_dir == r.parent_dir && k.name == r.name))
            });
            Ok(())
        }

        async fn list_subtree(&self, root: &str) -> Result<Vec<ShadowRow>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.root == root)
                .cloned()
                .collect())
        }
    }

    fn build_tree() -> (InMemoryFs, PathBuf) {
        let root = PathBuf::from("/w");
        let mut fs = InMemoryFs::new();
        fs.add_dir(&root);
        fs.add_dir(root.join("dir"));
        fs.add_file(root.join("dir").join("a"), 10);
        fs.add_file(root.join("dir").join("b"), 20);
        (fs, root)
    }

    #[tokio::test]
    async fn initial_scan_seeds_without_events() {
        let (fs, root) = build_tree();
        let scanner = PathScanner::new(fs);
        let store = MemStore::default();

        scanner.initial_scan(&store, &root).await.unwrap();
        assert!(!store.is_empty(&root.to_string_lossy()).await.unwrap());

        // Idempotent: a second call does nothing because the index is no
        // longer empty.
        scanner.initial_scan(&store, &root).await.unwrap();
        let rows = store.list_subtree(&root.to_string_lossy()).await.unwrap();
        assert_eq!(rows.len(), 3); // dir, a, b
    }

    #[tokio::test]
    async fn diff_scan_detects_offline_gap() {
        let (mut fs, root) = build_tree();
        let scanner = PathScanner::new(fs.clone());
        let store = MemStore::default();
        scanner.initial_scan(&store, &root).await.unwrap();

        // Simulate offline changes: delete `a`, add `c`.
        fs.remove(root.join("dir").join("a"));
        fs.add_file(root.join("dir").join("c"), 30);
        let scanner = PathScanner::new(fs);

        let diff = scanner.diff_scan(&store, &root).await.unwrap();
        assert_eq!(diff.created.len(), 1);
        assert_eq!(diff.created[0].name, "c");
        assert_eq!(diff.deleted.len(), 1);
        assert_eq!(diff.deleted[0].name, "a");
        assert!(diff.modified.is_empty());
    }

    #[tokio::test]
    async fn diff_scan_then_apply_then_rediff_is_empty() {
        let (fs, root) = build_tree();
        let scanner = PathScanner::new(fs);
        let store = MemStore::default();

        let diff = scanner.diff_scan(&store, &root).await.unwrap();
        scanner.apply_diff(&store, &root, &diff).await.unwrap();
        let diff2 = scanner.diff_scan(&store, &root).await.unwrap();
        assert!(diff2.is_empty());
    }

    #[tokio::test]
    async fn directory_mtime_never_counts_as_modified() {
        let (fs, root) = build_tree();
        let scanner = PathScanner::new(fs);
        let store = MemStore::default();
        scanner.initial_scan(&store, &root).await.unwrap();

        let diff = scanner.diff_scan(&store, &root).await.unwrap();
        assert!(diff.is_empty());
    }
}
