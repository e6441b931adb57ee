//! This crate's error type.

use std::io;
use std::path::PathBuf;

/// Describes every error surfaced by the core engine, matching the
/// three-kind taxonomy: usage/configuration mistakes, I/O failures, and
/// per-entry value errors.
#[derive(thiserror::Error, Debug)]
pub enum CedarError {
    /// Invalid argument, bad config, usage-order violation, or a graph
    /// cycle. Always fatal to the current action.
    #[error("{0}")]
    Usage(String),

    /// A filesystem operation, subprocess, mount, or media-capacity check
    /// failed.
    #[error("{0}")]
    Io(String),

    /// Wraps a bare `std::io::Error` with no synthesized message.
    #[error("io error: {0}")]
    StdIo(#[from] io::Error),

    /// A per-entry error encountered while building a list or writing an
    /// archive.
    #[error("value error for `{path}`: {message}")]
    Value {
        /// Path of the offending entry.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// Error surfaced by `cedar-fs` (filesystem list, digest, knapsack,
    /// graph).
    #[error("filesystem error: {0}")]
    Fs(#[from] cedar_fs::FsError),

    /// Failure parsing or validating a configuration document.
    #[error("configuration error: {0}")]
    Config(#[from] serde_yaml::Error),
}

impl CedarError {
    /// Build a [`CedarError::Usage`] from a formatted message.
    pub fn usage(message: impl Into<String>) -> Self {
        CedarError::Usage(message.into())
    }

    /// Build a [`CedarError::Io`] from a formatted message.
    pub fn io(message: impl Into<String>) -> Self {
        CedarError::Io(message.into())
    }

    /// Build a [`CedarError::Value`] tagging the failing path.
    pub fn value(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        CedarError::Value {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, CedarError>;
