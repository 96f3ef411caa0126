//! Error types for patching.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for patch operations.
pub type PatchResult<T> = Result<T, PatchError>;

/// Errors that can occur while patching a file on disk.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("File not found for patching: {0}")]
    FileNotFound(PathBuf),

    #[error("Replacement for {0} is empty")]
    EmptyReplacement(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
