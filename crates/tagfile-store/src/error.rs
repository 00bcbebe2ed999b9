//! Store error type.

use std::io;

use tagfile_core::CoreError;
use thiserror::Error;

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from entry store and tag index operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}
