//! Error types for tether.
//!
//! Remote and storage failures never escape a component as panics: automatic
//! paths log them and broadcast a [`crate::notice::SaveNotice`] or
//! [`crate::notice::MutationNotice`], manual paths return them.

use thiserror::Error;

/// Failure reported by a remote persistence or mutation call.
///
/// A rejected call must not have partially applied.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote call failed: {0}")]
    Failed(String),

    #[error("remote call timed out")]
    Timeout,

    #[error("remote rejected the write: {0}")]
    Rejected(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RemoteError {
    pub fn failed(message: impl Into<String>) -> Self { Self::Failed(message.into()) }
}

/// Failure of the durable local store.
///
/// Any of these disables the durable mirror for the session that hit it.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("durable store unavailable: {0}")]
    Unavailable(String),

    #[error("durable store backend error: {0}")]
    Backend(String),
}

/// Error returned from a manual [`crate::autosave::Autosave::save_now`]
#[derive(Debug, Error)]
pub enum AutosaveError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("working value could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("autosave has been closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("invalid autosave config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("autosave timers need a tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
