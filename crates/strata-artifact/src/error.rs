//! Artifact error types.

use std::path::PathBuf;

/// Errors that can occur while opening or reading a container.
///
/// A missing entry is never an error; lookup methods return `None` for
/// absent paths. An error from a container that should be readable means
/// the container itself is broken (corruption, permissions, truncation)
/// and must not be masked as "not found".
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// File I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Archive is unreadable or structurally invalid
    #[error("Archive error in {path}: {message}")]
    Archive { path: PathBuf, message: String },

    /// Manifest is present but cannot be parsed
    #[error("Manifest parse error: {0}")]
    Manifest(String),
}

impl ArtifactError {
    pub(crate) fn archive(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        ArtifactError::Archive {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
