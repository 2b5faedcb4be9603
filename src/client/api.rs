//! Endpoint bindings for the sandbox REST API

use super::{ByteStream, SandboxClient};
use crate::error::{Error, Result};
use crate::types::{Task, TaskId, TaskStatus};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, error, info, warn};

impl SandboxClient {
    /// Find the tasks that analysed a sample with the given MD5
    ///
    /// Returns an empty list when the listing has no `tasks` field or nothing matches.
    pub async fn task_ids_for_md5(&self, md5: &str) -> Result<Vec<TaskId>> {
        let response = self.get_json("/tasks/list", &[]).await?;
        Ok(task_ids_from_listing(&response, md5))
    }

    /// Find the tasks that analysed the given local file (looked up by its MD5)
    pub async fn task_ids_for_file(&self, path: &Path) -> Result<Vec<TaskId>> {
        let content = tokio::fs::read(path).await?;
        let md5 = format!("{:x}", md5::compute(&content));
        debug!(?path, md5 = %md5, "looking up tasks for sample");
        self.task_ids_for_md5(&md5).await
    }

    /// Current status of a task
    ///
    /// `Ok(None)` means the sandbox answered without a `task.status` field.
    pub async fn task_status(&self, task_id: TaskId) -> Result<Option<TaskStatus>> {
        let response = self
            .get_json(&format!("/tasks/view/{}", task_id), &[])
            .await?;

        let status = response
            .get("task")
            .and_then(|task| task.get("status"))
            .and_then(Value::as_str)
            .map(TaskStatus::from);

        if status.is_none() {
            warn!(task_id = %task_id, "task view response carries no status");
        }
        Ok(status)
    }

    /// Full JSON report of a task
    ///
    /// `Ok(None)` when the sandbox answers with an empty document.
    pub async fn task_report(&self, task_id: TaskId) -> Result<Option<Value>> {
        debug!(task_id = %task_id, "downloading report");
        let report = self
            .get_json(&format!("/tasks/report/{}", task_id), &[])
            .await?;

        if is_empty_document(&report) {
            warn!(task_id = %task_id, "no report received");
            return Ok(None);
        }
        Ok(Some(report))
    }

    /// Names of the memory dumps available for a task
    ///
    /// `Ok(None)` when the listing has no `dump_files` field.
    pub async fn memory_dump_list(&self, task_id: TaskId) -> Result<Option<Vec<String>>> {
        let response = self
            .get_json(&format!("/memory/list/{}", task_id), &[])
            .await?;

        let Some(files) = response.get("dump_files").and_then(Value::as_array) else {
            warn!(task_id = %task_id, "memory listing carries no dump_files");
            return Ok(None);
        };

        Ok(Some(
            files
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ))
    }

    /// Raw memory dump of one process
    pub async fn memory_dump(&self, task_id: TaskId, process: &str) -> Result<ByteStream> {
        debug!(task_id = %task_id, process, "downloading process memory");
        self.get_stream(&format!("/memory/get/{}/{}", task_id, process), &[])
            .await
    }

    /// Dropped-files bundle of a task (tar archive with bzip2 compression)
    pub async fn dropped_files(&self, task_id: TaskId) -> Result<ByteStream> {
        debug!(task_id = %task_id, "downloading dropped files");
        self.get_stream(&format!("/tasks/report/{}/dropped", task_id), &[])
            .await
    }

    /// Raw machine listing
    pub async fn machines_list(&self) -> Result<Value> {
        self.get_json("/machines/list/", &[]).await
    }

    /// Submit a local file for analysis
    ///
    /// Tags are sent comma-joined and only when non-empty; `options` is always sent empty.
    ///
    /// # Errors
    /// [`Error::Submission`] when the sandbox flags an error or returns no task id,
    /// transport errors otherwise.
    pub async fn create_file_task(&self, path: &Path, tags: &[String]) -> Result<Task> {
        debug!(?path, tags = %tags.join(","), "creating task");

        let mut fields = vec![("options", String::new())];
        if !tags.is_empty() {
            fields.push(("tags", tags.join(",")));
        }

        let response = self.post_file("/tasks/create/file", path, &fields).await?;
        let task_id = task_id_from_submission(path, &response)?;

        info!(?path, task_id = %task_id, "sample submitted");
        Ok(Task::submitted(task_id, tags.iter().cloned()))
    }
}

/// Pull the matching task ids out of a `/tasks/list` response
pub(crate) fn task_ids_from_listing(response: &Value, md5: &str) -> Vec<TaskId> {
    let Some(tasks) = response.get("tasks").and_then(Value::as_array) else {
        return Vec::new();
    };

    tasks
        .iter()
        .filter(|task| {
            task.get("sample")
                .and_then(|s| s.get("md5"))
                .and_then(Value::as_str)
                .is_some_and(|m| m.eq_ignore_ascii_case(md5))
        })
        .filter_map(|task| {
            task.get("guest")
                .and_then(|g| g.get("task_id"))
                .or_else(|| task.get("id"))
                .and_then(task_id_from_value)
        })
        .collect()
}

/// Whether an `error` field marks the response as failed; empty and zero values do not
fn is_flagged(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

/// Interpret a `/tasks/create/file` response
pub(crate) fn task_id_from_submission(path: &Path, response: &Value) -> Result<TaskId> {
    if response.get("error").is_some_and(is_flagged) {
        let reason = response
            .get("error_value")
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .unwrap_or_else(|| "unspecified error".to_string());
        error!(?path, error = %reason, "sandbox refused the task");
        return Err(Error::Submission {
            path: path.to_path_buf(),
            reason,
        });
    }

    response
        .get("task_id")
        .and_then(task_id_from_value)
        .ok_or_else(|| {
            error!(?path, "received no task id for submission");
            Error::Submission {
                path: path.to_path_buf(),
                reason: "no task id in response".to_string(),
            }
        })
}

fn task_id_from_value(value: &Value) -> Option<TaskId> {
    match value {
        Value::Number(n) => n.as_u64().map(TaskId),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn is_empty_document(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
