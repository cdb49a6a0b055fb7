//! Error types for directory operations.
//!
//! Each failure class gets its own tagged type so callers can react to the
//! structure of a failure and only render it to a string at the boundary:
//!
//! - [`ListError`]: the directory as a whole could not be enumerated
//! - [`MutationError`]: one item of a bulk delete/import failed
//! - [`OperationError`]: a single create/rename/collaborator operation failed
//! - [`NamingError`]: the collision probe ceiling was reached
//! - [`StateError`]: the state task is gone or a background task died

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::collaborators::{CollaboratorError, ImportError};

/// Errors that can occur while enumerating a directory.
#[derive(Debug, Error)]
pub enum ListError {
    /// The requested directory does not exist.
    #[error("directory does not exist: {0}")]
    NotFound(PathBuf),

    /// The requested path is not a directory.
    #[error("path is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Any other IO error.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ListError {
    /// Classify an IO error raised while reading `path`.
    pub(crate) fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

/// Why a single item of a bulk operation failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationFailure {
    /// The import source was gone by the time it was attempted.
    #[error("source does not exist")]
    SourceMissing,

    /// The import source path does not end in a file name (e.g. `dir/..`).
    #[error("source has no file name")]
    NoFileName,

    /// A directory cannot be copied into itself.
    #[error("destination is inside the source directory")]
    DestinationInsideSource,

    /// The filesystem call failed.
    #[error("{message}")]
    Io {
        kind: io::ErrorKind,
        message: String,
    },
}

impl From<io::Error> for MutationFailure {
    fn from(err: io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Failure of one item inside a bulk operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{item_name}: {reason}")]
pub struct MutationError {
    /// Display name of the item.
    pub item_name: String,
    /// Path the operation was attempted on.
    pub path: PathBuf,
    /// What went wrong.
    pub reason: MutationFailure,
}

impl MutationError {
    pub(crate) fn new(
        item_name: impl Into<String>,
        path: &Path,
        reason: impl Into<MutationFailure>,
    ) -> Self {
        Self {
            item_name: item_name.into(),
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Collision probing ran out of candidates.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NamingError {
    #[error("no free name for {desired} after {attempts} attempts")]
    Exhausted {
        desired: PathBuf,
        last_probe: PathBuf,
        attempts: u32,
    },
}

/// Errors from the directory state task.
#[derive(Debug, Error)]
pub enum StateError {
    /// The state task has shut down.
    #[error("directory state has shut down")]
    Closed,

    /// A blocking filesystem task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Background(String),

    /// Listing the directory failed.
    #[error(transparent)]
    Listing(#[from] ListError),
}

impl From<tokio::task::JoinError> for StateError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Background(err.to_string())
    }
}

/// Failure of a single, non-batched operation.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("failed to create folder {name}: {source}")]
    CreateFolder {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to create file {name}: {source}")]
    CreateFile {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: String,
        to: String,
        #[source]
        source: io::Error,
    },

    /// The entry does not carry the classification the operation needs.
    #[error("{name} is not {expected}")]
    Unsupported { name: String, expected: &'static str },

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl OperationError {
    /// Whether the certificate importer rejected the password.
    ///
    /// Callers use this to re-prompt instead of showing an error.
    pub fn is_invalid_password(&self) -> bool {
        matches!(self, Self::Import(ImportError::InvalidPassword))
    }
}
