use super::Sandbox;
use crate::types::{Event, TaskId};
use std::path::Path;
use tracing::error;

impl Sandbox {
    /// Submit a local file for analysis
    ///
    /// Returns the id of the created task, or an empty list when the submission failed for
    /// any reason (missing file, transport failure, sandbox refusal). Failures are logged,
    /// never returned. Use [`crate::SandboxClient::create_file_task`] for the error itself.
    pub async fn submit_file(&self, path: &Path, tags: &[String]) -> Vec<TaskId> {
        match self.client.create_file_task(path, tags).await {
            Ok(task) => {
                self.emit(Event::TaskSubmitted {
                    task_id: task.task_id,
                    path: path.to_path_buf(),
                });
                vec![task.task_id]
            }
            Err(e) => {
                error!(?path, code = e.code(), error = %e, "failed to submit sample");
                Vec::new()
            }
        }
    }

    /// Tasks that already analysed this file, matched by MD5
    ///
    /// Returns an empty list when the lookup fails.
    pub async fn find_tasks(&self, path: &Path) -> Vec<TaskId> {
        self.client
            .task_ids_for_file(path)
            .await
            .unwrap_or_else(|e| {
                error!(?path, error = %e, "failed to look up tasks for sample");
                Vec::new()
            })
    }
}
