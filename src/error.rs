use thiserror::Error;

/// Error taxonomy for the change-tracking engine (shadow index, scanner,
/// persistent queue, and filesystem monitor).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("shadow index storage error: {0}")]
    ShadowIndexIo(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to install watch for {path}: {reason}")]
    WatchInstallFailure { path: String, reason: String },

    #[error("queue key already exists")]
    AlreadyExists,

    #[error("update for non-existing queue key")]
    UpdateForNonExistingKey,

    #[error("queue is empty")]
    Empty,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
