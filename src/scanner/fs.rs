//! Minimal async filesystem abstraction used by the Path Scanner, so tests
//! can substitute an in-memory tree without touching disk.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Lightweight metadata needed by the scanner.
#[derive(Debug, Clone, Copy)]
pub struct FsMetadata {
    pub is_dir: bool,
    pub mtime_secs: Option<i64>,
}

#[async_trait]
pub trait FileSystem: Send + Sync {
    /// List the immediate children of `path`. Symlinks are not followed.
    async fn read_dir(&self, path: &Path) -> std::io::Result<Vec<PathBuf>>;

    /// Fetch lightweight metadata without following symlinks.
    async fn symlink_metadata(&self, path: &Path) -> std::io::Result<FsMetadata>;
}

/// Real filesystem implementation backed by `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

#[async_trait]
impl FileSystem for RealFs {
    async fn read_dir(&self, path: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut rd = tokio::fs::read_dir(path).await?;
        let mut out = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            out.push(entry.path());
        }
        Ok(out)
    }

    async fn symlink_metadata(&self, path: &Path) -> std::io::Result<FsMetadata> {
        let md = tokio::fs::symlink_metadata(path).await?;
        let mtime_secs = if md.is_dir() {
            None
        } else {
            md.modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
        };
        Ok(FsMetadata {
            is_dir: md.is_dir(),
            mtime_secs,
        })
    }
}

/// In-memory filesystem for tests.
#[derive(Default, Clone)]
pub struct InMemoryFs {
    nodes: HashMap<PathBuf, Node>,
}

#[derive(Clone)]
enum Node {
    Dir { children: Vec<PathBuf> },
    File { mtime_secs: i64 },
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir<P: Into<PathBuf>>(&mut self, path: P) {
        let path = path.into();
        self.ensure_parent_link(&path);
        self.nodes.entry(path).or_insert(Node::Dir {
            children: Vec::new(),
        });
    }

    pub fn add_file<P: Into<PathBuf>>(&mut self, path: P, mtime_secs: i64) {
        let path = path.into();
        self.ensure_parent_link(&path);
        self.nodes.insert(path, Node::File { mtime_secs });
    }

    pub fn remove<P: AsRef<Path>>(&mut self, path: P) {
        let path = path.as_ref();
        self.nodes.remove(path);
        if let Some(parent) = path.parent() {
            if let Some(Node::Dir { children }) = self.nodes.get_mut(parent) {
                children.retain(|c| c != path);
            }
        }
    }

    pub fn set_mtime<P: AsRef<Path>>(&mut self, path: P, mtime_secs: i64) {
        if let Some(Node::File { mtime_secs: m }) = self.nodes.get_mut(path.as_ref()) {
            *m = mtime_secs;
        }
    }

    fn ensure_parent_link(&mut self, path: &Path) {
        if let Some(parent) = path.parent() {
            if !self.nodes.contains_key(parent) {
                self.nodes.insert(
                    parent.to_path_buf(),
                    Node::Dir {
                        children: Vec::new(),
                    },
                );
                self.ensure_parent_link(parent);
            }
            if let Some(Node::Dir { children }) = self.nodes.get_mut(parent) {
                if !children.iter().any(|p| p.as_path() == path) {
                    children.push(path.to_path_buf());
                }
            }
        }
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read_dir(&self, path: &Path) -> std::io::Result<Vec<PathBuf>> {
        match self.nodes.get(path) {
            Some(Node::Dir { children }) => Ok(children.clone()),
            Some(Node::File { .. }) => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("read_dir on file: {path:?}"),
            )),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such path: {path:?}"),
            )),
        }
    }

    async fn symlink_metadata(&self, path: &Path) -> std::io::Result<FsMetadata> {
        match self.nodes.get(path) {
            Some(Node::Dir { .. }) => Ok(FsMetadata {
                is_dir: true,
                mtime_secs: None,
            }),
            Some(Node::File { mtime_secs }) => Ok(FsMetadata {
                is_dir: false,
                mtime_secs: Some(*mtime_secs),
            }),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such path: {path:?}"),
            )),
        }
    }
}
