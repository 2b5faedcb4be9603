//! Core types for cuckoo-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Identifier the sandbox assigns to a task at submission time
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<TaskId> for u64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl PartialEq<u64> for TaskId {
    fn eq(&self, other: &u64) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Task status as reported by the sandbox
///
/// The vocabulary belongs to the sandbox. Only [`TaskStatus::Reported`] and
/// [`TaskStatus::Error`] are terminal; anything unrecognized is kept verbatim in
/// [`TaskStatus::Other`] and treated as still in progress.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    /// Waiting for a machine
    Pending,
    /// Sample is executing
    Running,
    /// Execution finished, processing not done yet
    Completed,
    /// Report is available (terminal success)
    Reported,
    /// Analysis failed (terminal failure)
    Error,
    /// Any other sandbox-defined state
    Other(String),
}

impl TaskStatus {
    /// Whether no further transition is expected after this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Reported | TaskStatus::Error)
    }

    /// The wire representation of this status
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Reported => "reported",
            TaskStatus::Error => "error",
            TaskStatus::Other(s) => s,
        }
    }
}

impl From<&str> for TaskStatus {
    fn from(s: &str) -> Self {
        match s {
            "pending" => TaskStatus::Pending,
            "running" => TaskStatus::Running,
            "completed" => TaskStatus::Completed,
            "reported" => TaskStatus::Reported,
            "error" => TaskStatus::Error,
            other => TaskStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        TaskStatus::from(s.as_str())
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted analysis job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Sandbox-assigned identifier
    pub task_id: TaskId,
    /// Last status observed by polling
    pub status: Option<TaskStatus>,
    /// Labels that constrain which machine runs the task
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Task {
    /// A freshly submitted task whose status has not been polled yet
    pub fn submitted(task_id: TaskId, tags: impl IntoIterator<Item = String>) -> Self {
        Self {
            task_id,
            status: None,
            tags: tags.into_iter().collect(),
        }
    }
}

/// A status change observed by the tracker
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    /// Previously observed status (None on the first observation)
    pub from: Option<TaskStatus>,
    /// Newly observed status
    pub to: TaskStatus,
    /// When the new status was observed
    pub observed_at: DateTime<Utc>,
}

/// The artifact kinds a retrieval produces
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    /// JSON report
    Report,
    /// Per-process memory dumps
    Memory,
    /// Dropped-files bundle
    Dropped,
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Artifact::Report => f.write_str("report"),
            Artifact::Memory => f.write_str("memory"),
            Artifact::Dropped => f.write_str("dropped"),
        }
    }
}

/// What a retrieval actually managed to write
///
/// Retrieval is best effort: every step is attempted regardless of the others, and this
/// summary tells the caller which parts of the output directory can be relied on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalSummary {
    /// Path of the written report, if one was retrieved
    pub report: Option<PathBuf>,
    /// Memory dump path per process identifier
    pub memory_dumps: BTreeMap<String, PathBuf>,
    /// Whether every listed process dump was written
    pub memory_complete: bool,
    /// Files left in the dropped directory after extraction
    pub dropped_files: Vec<PathBuf>,
    /// Whether the dropped bundle was downloaded and fully extracted
    pub dropped_complete: bool,
}

impl RetrievalSummary {
    /// Whether the report, memory and dropped steps all succeeded
    pub fn is_complete(&self) -> bool {
        self.report.is_some() && self.memory_complete && self.dropped_complete
    }
}

/// Event emitted while submitting, tracking and retrieving tasks
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A sample was accepted by the sandbox
    TaskSubmitted {
        /// Task ID
        task_id: TaskId,
        /// Submitted sample
        path: PathBuf,
    },

    /// The tracker observed a new status
    StatusChanged {
        /// Task ID
        task_id: TaskId,
        /// Previous status (None on the first poll)
        from: Option<TaskStatus>,
        /// New status
        to: TaskStatus,
    },

    /// The JSON report was written
    ReportSaved {
        /// Task ID
        task_id: TaskId,
        /// Report file
        path: PathBuf,
    },

    /// A process memory dump was written
    MemoryDumpSaved {
        /// Task ID
        task_id: TaskId,
        /// Process identifier
        process: String,
        /// Dump file
        path: PathBuf,
    },

    /// The dropped-files bundle was extracted
    DroppedExtracted {
        /// Task ID
        task_id: TaskId,
        /// Number of files left after extraction
        file_count: usize,
    },

    /// One retrieval step failed (the others carry on)
    ArtifactFailed {
        /// Task ID
        task_id: TaskId,
        /// Which step failed
        artifact: Artifact,
        /// Machine-readable error code
        code: String,
        /// Human-readable error
        message: String,
    },
}
