//! This crate's error type.

use std::io;
use std::path::PathBuf;

/// Describes all error variants surfaced by `cedar-fs`.
///
/// Mirrors the three-kind taxonomy used throughout the wider Cedar Backup
/// engine: usage/configuration mistakes, I/O failures, and per-entry value
/// errors encountered while building a list or writing an archive.
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    /// An argument was structurally invalid (bad regex, capacity too small
    /// for an item, unknown knapsack algorithm name, etc).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A path was required to be absolute but was not.
    #[error("path is not absolute: `{0}`")]
    NotAbsolute(PathBuf),

    /// A knapsack/span operation could not make progress.
    #[error("unable to add any new items")]
    UnableToFit,

    /// A regular filesystem operation failed.
    #[error("io error on `{path}`: {source}")]
    Io {
        /// Path the operation was attempted against.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A bare I/O error with no associated path (e.g. tar stream writes).
    #[error("io error: {0}")]
    PlainIo(#[from] io::Error),

    /// Failure building or parsing an archive entry.
    #[error("archive error for `{path}`: {message}")]
    Archive {
        /// Path of the offending entry.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },
}

impl FsError {
    /// Build an [`FsError::Io`] tagging the failing path.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        FsError::Io {
            path: path.into(),
            source,
        }
    }

    /// Build an [`FsError::Archive`] for a failed per-entry tar operation.
    pub fn archive(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        FsError::Archive {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, FsError>;
