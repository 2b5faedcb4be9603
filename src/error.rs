//! Error types for cuckoo-dl
//!
//! This module provides error handling for the library, including:
//! - Transport failures (non-200 responses, undecodable bodies, network errors)
//! - Task lifecycle failures (terminal error state, polling exhaustion, timeout, cancellation)
//! - Archive extraction failures for the dropped-files bundle
//! - Machine-readable error codes for event consumers

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::TaskId;

/// Result type alias for cuckoo-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for cuckoo-dl
///
/// Transport failures never panic or escape as anything other than one of these variants,
/// so callers can always tell "the sandbox answered with nothing" apart from "the request failed".
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "base_url")
        key: Option<String>,
    },

    /// The sandbox answered with a non-200 status
    #[error("HTTP {status} for {url}")]
    Http {
        /// HTTP status code returned by the sandbox
        status: u16,
        /// The requested URL
        url: String,
    },

    /// The response body was not the JSON we expected
    #[error("failed to decode response from {url}: {reason}")]
    Decode {
        /// The requested URL
        url: String,
        /// Why decoding failed
        reason: String,
    },

    /// Network error (connect, timeout, TLS, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Archive extraction error
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// The sandbox refused or did not acknowledge a submission
    #[error("submission of {path} failed: {reason}")]
    Submission {
        /// The sample that was submitted
        path: PathBuf,
        /// The reason the submission failed
        reason: String,
    },

    /// The sandbox reported the `error` state for a task
    #[error("task {task_id} ended in the error state")]
    TaskFailed {
        /// The task that failed
        task_id: TaskId,
    },

    /// Too many consecutive polls returned no status
    #[error("no status available for task {task_id} after {attempts} consecutive attempts")]
    PollingUnavailable {
        /// The task being tracked
        task_id: TaskId,
        /// Number of consecutive failed polls
        attempts: u32,
    },

    /// The polling deadline passed before a terminal status was observed
    #[error("task {task_id} did not finish within {elapsed:?}")]
    Timeout {
        /// The task being tracked
        task_id: TaskId,
        /// How long we waited
        elapsed: Duration,
    },

    /// Tracking was cancelled by the caller
    #[error("tracking of task {task_id} was cancelled")]
    Cancelled {
        /// The task being tracked
        task_id: TaskId,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Failures while materializing a nested archive bundle
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The outer tar/bzip2 archive could not be read or unpacked
    #[error("failed to extract outer archive {archive}: {reason}")]
    OuterArchive {
        /// The outer archive
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },

    /// A first-level zip archive could not be read or unpacked
    #[error("failed to extract zip archive {archive}: {reason}")]
    NestedZip {
        /// The zip archive
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },

    /// An intermediate archive could not be removed after extraction
    #[error("failed to remove {path}: {reason}")]
    Cleanup {
        /// The file that could not be removed
        path: PathBuf,
        /// The reason removal failed
        reason: String,
    },
}

impl Error {
    /// Machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Http { .. } => "http_error",
            Error::Decode { .. } => "decode_error",
            Error::Network(_) => "network_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Archive(e) => match e {
                ArchiveError::OuterArchive { .. } => "outer_archive_failed",
                ArchiveError::NestedZip { .. } => "nested_zip_failed",
                ArchiveError::Cleanup { .. } => "archive_cleanup_failed",
            },
            Error::Submission { .. } => "submission_failed",
            Error::TaskFailed { .. } => "task_failed",
            Error::PollingUnavailable { .. } => "polling_unavailable",
            Error::Timeout { .. } => "timeout",
            Error::Cancelled { .. } => "cancelled",
            Error::Other(_) => "internal_error",
        }
    }

    /// Whether this error only means "the sandbox has nothing for us" (404)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Http { status: 404, .. })
    }
}
