//! High-level sandbox workflow
//!
//! [`Sandbox`] ties the pieces together: it owns the [`SandboxClient`], hands out
//! [`TaskTracker`]s for waiting on tasks, and runs the result retrieval pipeline.
//! The workflow is split across submodules:
//! - [`submission`] - Sample submission
//! - [`retrieval`] - Report, memory and dropped-files retrieval
//! - [`tags`] - Machine tag discovery

mod retrieval;
mod submission;
mod tags;


pub use retrieval::write_report;
pub use tags::collect_tags;

use crate::client::SandboxClient;
use crate::config::Config;
use crate::error::Result;
use crate::tracker::TaskTracker;
use crate::types::{Event, TaskId};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Client-side orchestrator for one sandbox instance
///
/// # Example
///
/// ```no_run
/// use cuckoo_dl::{Config, Sandbox};
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> cuckoo_dl::Result<()> {
///     let sandbox = Sandbox::new(Config::new("http://localhost:8090"))?;
///
///     let tags = vec!["windows7".to_string()];
///     for task_id in sandbox.submit_file(Path::new("sample.exe"), &tags).await {
///         if sandbox.wait_for_completion(task_id, &CancellationToken::new()).await? {
///             let summary = sandbox.download_results(Path::new("out"), task_id).await?;
///             println!("complete: {}", summary.is_complete());
///         }
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Sandbox {
    client: SandboxClient,
    event_tx: broadcast::Sender<Event>,
}

impl Sandbox {
    /// Create a sandbox orchestrator from configuration
    ///
    /// # Errors
    /// Returns [`crate::Error::Config`] if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self::from_client(SandboxClient::new(config)?))
    }

    /// Wrap an existing client
    pub fn from_client(client: SandboxClient) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { client, event_tx }
    }

    /// The underlying transport client
    pub fn client(&self) -> &SandboxClient {
        &self.client
    }

    /// The active configuration
    pub fn config(&self) -> &Config {
        self.client.config()
    }

    /// Subscribe to workflow events
    ///
    /// Each subscriber receives every event emitted after it subscribed. A subscriber that
    /// falls more than the channel capacity behind gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Replace the proxy settings used for every subsequent request
    ///
    /// Set this once before sharing the sandbox between concurrent workflows.
    pub fn set_proxy(&mut self, http: Option<String>, https: Option<String>) -> Result<()> {
        self.client.set_proxy(http, https)
    }

    /// A tracker for one task, wired to this sandbox's events and polling settings
    pub fn tracker(&self) -> TaskTracker<'_, SandboxClient> {
        TaskTracker::new(&self.client, self.config().polling.clone())
            .with_events(self.event_tx.clone())
    }

    /// Block until the task is `reported` (`Ok(true)`) or in the `error` state (`Ok(false)`)
    ///
    /// # Errors
    /// Cancellation, the polling deadline and persistent status unavailability are
    /// reported as [`crate::Error::Cancelled`], [`crate::Error::Timeout`] and
    /// [`crate::Error::PollingUnavailable`].
    pub async fn wait_for_completion(
        &self,
        task_id: TaskId,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        self.tracker().wait_for_completion(task_id, cancel).await
    }

    pub(crate) fn emit(&self, event: Event) {
        // Nobody listening is not an error
        self.event_tx.send(event).ok();
    }
}
