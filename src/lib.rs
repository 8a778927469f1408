//! Durable change-tracking engine: a watched-tree event producer
//! reconciled against a persistent shadow index, plus an infinite keyed
//! persistent queue for consuming the resulting work.

pub mod config;
pub mod error;
pub mod monitor;
pub mod queue;
pub mod scanner;
pub mod shadow_index;
pub mod types;

pub use config::{QueueConfig, WatchConfig};
pub use error::{EngineError, Result};
pub use monitor::{ConsumerCallback, EventMask, FsMonitorCore, ReconciliationMode};
pub use queue::SqlitePersistentQueue;
pub use scanner::PathScanner;
pub use scanner::fs::{FileSystem, FsMetadata, RealFs};
pub use shadow_index::{ShadowIndexStore, SqliteShadowIndexStore};
pub use types::{CanonicalEventKind, DiffResult, ShadowKey, ShadowRow, SourceTag};
