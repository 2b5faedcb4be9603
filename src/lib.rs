//! # cuckoo-dl
//!
//! Client-side orchestrator for a Cuckoo malware-analysis sandbox.
//!
//! ## Design Philosophy
//!
//! cuckoo-dl is designed to be:
//! - **Explicit about failure** - Transport errors are values, never panics or silent nulls
//! - **Best effort where it matters** - Result retrieval keeps going when one artifact fails
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Cancellable** - Every wait takes a cancellation token and an optional deadline
//!
//! ## Quick Start
//!
//! ```no_run
//! use cuckoo_dl::{Config, Sandbox};
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sandbox = Sandbox::new(Config::new("http://localhost:8090"))?;
//!
//!     // Subscribe to events
//!     let mut events = sandbox.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Stop waiting on Ctrl+C
//!     let cancel = CancellationToken::new();
//!     tokio::spawn(cuckoo_dl::cancel_on_signal(cancel.clone()));
//!
//!     let tags = vec!["windows7".to_string(), "x64".to_string()];
//!     for task_id in sandbox.submit_file(Path::new("sample.exe"), &tags).await {
//!         if sandbox.wait_for_completion(task_id, &cancel).await? {
//!             let summary = sandbox.download_results(Path::new("out"), task_id).await?;
//!             println!("complete: {}", summary.is_complete());
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// HTTP transport and endpoint bindings
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Nested archive extraction
pub mod extraction;
/// Retry logic with exponential backoff
pub mod retry;
/// Submission, retrieval and tag discovery workflow
pub mod sandbox;
/// Task lifecycle tracking
pub mod tracker;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;


// Re-export commonly used types
pub use client::{ByteStream, SandboxClient};
pub use config::{Config, ExtractionConfig, PollingConfig, ProxyConfig, RetryConfig};
pub use error::{ArchiveError, Error, Result};
pub use sandbox::Sandbox;
pub use tracker::{StatusSource, TaskTracker, cancel_on_signal};
pub use types::{
    Artifact, Event, RetrievalSummary, StatusTransition, Task, TaskId, TaskStatus,
};
