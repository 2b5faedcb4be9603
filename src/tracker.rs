//! Task lifecycle tracking
//!
//! [`TaskTracker`] polls a task's status until the sandbox reports a terminal state.
//! `reported` ends the wait with `Ok(true)`, `error` with `Ok(false)`. Every other value,
//! including ones we do not know, keeps the loop going.
//!
//! The loop is cooperative: a [`CancellationToken`] is checked before every poll and
//! raced against both the status request and the sleep between polls. An optional deadline,
//! raced the same way, and a cap on consecutive "no status" polls bound it further (see
//! [`PollingConfig`]).

use crate::client::SandboxClient;
use crate::config::PollingConfig;
use crate::error::{Error, Result};
use crate::types::{Event, StatusTransition, TaskId, TaskStatus};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the tracker reads task status from
#[async_trait::async_trait]
pub trait StatusSource: Send + Sync {
    /// Current status of a task, `Ok(None)` when the sandbox answered without one
    async fn task_status(&self, task_id: TaskId) -> Result<Option<TaskStatus>>;
}

#[async_trait::async_trait]
impl StatusSource for SandboxClient {
    async fn task_status(&self, task_id: TaskId) -> Result<Option<TaskStatus>> {
        SandboxClient::task_status(self, task_id).await
    }
}

/// Polls one task until it reaches a terminal status
///
/// A tracker keeps the history of what it observed, so it can be inspected after
/// [`wait_for_completion`](Self::wait_for_completion) returns.
pub struct TaskTracker<'a, S: StatusSource + ?Sized> {
    source: &'a S,
    config: PollingConfig,
    event_tx: Option<broadcast::Sender<Event>>,
    polls: u32,
    last_status: Option<TaskStatus>,
    history: Vec<StatusTransition>,
}

impl<'a, S: StatusSource + ?Sized> TaskTracker<'a, S> {
    /// Create a tracker reading from `source`
    pub fn new(source: &'a S, config: PollingConfig) -> Self {
        Self {
            source,
            config,
            event_tx: None,
            polls: 0,
            last_status: None,
            history: Vec::new(),
        }
    }

    /// Broadcast a [`Event::StatusChanged`] for every observed transition
    pub fn with_events(mut self, event_tx: broadcast::Sender<Event>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Number of status requests issued so far
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Last status the sandbox reported
    pub fn last_status(&self) -> Option<&TaskStatus> {
        self.last_status.as_ref()
    }

    /// Every status change observed, oldest first
    pub fn history(&self) -> &[StatusTransition] {
        &self.history
    }

    /// Poll until the task reaches a terminal status
    ///
    /// # Returns
    /// `Ok(true)` once the task is `reported`, `Ok(false)` once it is in the `error` state.
    ///
    /// # Errors
    /// - [`Error::Cancelled`] when `cancel` fires
    /// - [`Error::Timeout`] when the configured deadline passes
    /// - [`Error::PollingUnavailable`] after too many polls in a row returned no status
    pub async fn wait_for_completion(
        &mut self,
        task_id: TaskId,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let started = Instant::now();
        let deadline = self.config.timeout.map(|timeout| started + timeout);
        let mut consecutive_failures: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                info!(task_id = %task_id, polls = self.polls, "tracking cancelled");
                return Err(Error::Cancelled { task_id });
            }

            if let Some(timeout) = self.config.timeout
                && started.elapsed() >= timeout
            {
                warn!(task_id = %task_id, ?timeout, "gave up waiting for task");
                return Err(Error::Timeout {
                    task_id,
                    elapsed: started.elapsed(),
                });
            }

            self.polls += 1;
            let observed = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(task_id = %task_id, polls = self.polls, "tracking cancelled");
                    return Err(Error::Cancelled { task_id });
                }
                _ = sleep_until_deadline(deadline) => {
                    warn!(task_id = %task_id, polls = self.polls, "deadline passed during status poll");
                    return Err(Error::Timeout {
                        task_id,
                        elapsed: started.elapsed(),
                    });
                }
                result = self.source.task_status(task_id) => result,
            };

            match observed {
                Ok(Some(status)) => {
                    consecutive_failures = 0;
                    self.observe(task_id, status.clone());

                    if status.is_terminal() {
                        let reported = status == TaskStatus::Reported;
                        if reported {
                            info!(task_id = %task_id, polls = self.polls, "analysis reported");
                        } else {
                            warn!(task_id = %task_id, polls = self.polls, "analysis ended in error");
                        }
                        return Ok(reported);
                    }
                }
                Ok(None) => {
                    consecutive_failures += 1;
                    debug!(task_id = %task_id, consecutive_failures, "no status available");
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(task_id = %task_id, consecutive_failures, error = %e, "status poll failed");
                }
            }

            if let Some(max) = self.config.max_consecutive_failures
                && consecutive_failures >= max
            {
                warn!(task_id = %task_id, attempts = consecutive_failures, "status unavailable, giving up");
                return Err(Error::PollingUnavailable {
                    task_id,
                    attempts: consecutive_failures,
                });
            }

            let delay = self.next_delay(started.elapsed());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(task_id = %task_id, polls = self.polls, "tracking cancelled");
                    return Err(Error::Cancelled { task_id });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Sleep for the poll interval, but never past the deadline
    fn next_delay(&self, elapsed: Duration) -> Duration {
        match self.config.timeout {
            Some(timeout) => self.config.interval.min(timeout.saturating_sub(elapsed)),
            None => self.config.interval,
        }
    }

    fn observe(&mut self, task_id: TaskId, status: TaskStatus) {
        if self.last_status.as_ref() == Some(&status) {
            return;
        }

        let from = self.last_status.replace(status.clone());
        info!(
            task_id = %task_id,
            from = from.as_ref().map(TaskStatus::as_str).unwrap_or("none"),
            to = %status,
            "task status changed"
        );

        self.history.push(StatusTransition {
            from: from.clone(),
            to: status.clone(),
            observed_at: chrono::Utc::now(),
        });

        if let Some(tx) = &self.event_tx {
            // No subscribers is fine
            tx.send(Event::StatusChanged {
                task_id,
                from,
                to: status,
            })
            .ok();
        }
    }
}

/// Resolves once `deadline` passes, never when there is none
async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Cancel `token` when the process receives SIGINT or SIGTERM (Ctrl+C on other platforms)
///
/// Typically spawned next to a long wait:
///
/// ```no_run
/// # async fn demo() {
/// let token = tokio_util::sync::CancellationToken::new();
/// tokio::spawn(cuckoo_dl::cancel_on_signal(token.clone()));
/// # }
/// ```
pub async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        _ = wait_for_signal() => token.cancel(),
        _ = token.cancelled() => {}
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration can fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("received SIGTERM, cancelling");
                }
                _ = sigint.recv() => {
                    info!("received SIGINT (Ctrl+C), cancelling");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
            info!("received Ctrl+C, cancelling");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, cancelling"),
        Err(e) => warn!(error = %e, "failed to listen for Ctrl+C"),
    }
}
