//! Error types for path resolution and the metadata codec.

use thiserror::Error;

use crate::key::KeyKind;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors from core operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid {kind} '{key}': {reason}")]
    InvalidKey {
        kind: KeyKind,
        key: String,
        reason: &'static str,
    },

    #[error("invalid file name prefix '{0}'")]
    InvalidPrefix(String),

    #[error("hashed directory level {0} exceeds maximum of {max}", max = crate::shard::MAX_SHARD_LEVEL)]
    InvalidLevel(usize),

    #[error("unknown read control type: {0}")]
    UnknownReadControl(String),

    #[error("metadata codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
