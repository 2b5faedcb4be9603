use super::Sandbox;
use crate::error::{Error, Result};
use crate::extraction::extract_nested_bundle;
use crate::types::{Artifact, Event, RetrievalSummary, TaskId};
use crate::utils::{distinct_process_ids, next_numbered_path};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// Subdirectory holding one dump per process
const MEMORY_DIR: &str = "memory";
/// Subdirectory holding the dropped files
const DROPPED_DIR: &str = "dropped";
/// Name the dropped bundle is downloaded under before extraction
const DROPPED_ARCHIVE: &str = "dropped.tar.bz2";
/// Failure code for a step whose answer lacked the expected data
const MISSING_DATA: &str = "missing_data";

impl Sandbox {
    /// Download every artifact of a finished task into `output_dir`
    ///
    /// `output_dir` is deleted and recreated first. The report, memory and dropped-files
    /// steps then run concurrently and fail independently: a failed step is logged, emitted
    /// as [`Event::ArtifactFailed`] and reflected in the returned summary, but never stops
    /// the others.
    ///
    /// Layout:
    /// ```text
    /// output_dir/report_N.json
    /// output_dir/memory/<pid>.dmp
    /// output_dir/dropped/...
    /// ```
    ///
    /// # Errors
    /// Only when `output_dir` cannot be prepared, since nothing could be written then.
    pub async fn download_results(
        &self,
        output_dir: &Path,
        task_id: TaskId,
    ) -> Result<RetrievalSummary> {
        prepare_output_dir(output_dir).await?;
        info!(task_id = %task_id, ?output_dir, "downloading results");

        let (report, (memory_dumps, memory_complete), (dropped_files, dropped_complete)) = tokio::join!(
            self.retrieve_report(output_dir, task_id),
            self.retrieve_memory(output_dir, task_id),
            self.retrieve_dropped(output_dir, task_id),
        );

        let summary = RetrievalSummary {
            report,
            memory_dumps,
            memory_complete,
            dropped_files,
            dropped_complete,
        };

        info!(
            task_id = %task_id,
            report = summary.report.is_some(),
            memory_dumps = summary.memory_dumps.len(),
            memory_complete = summary.memory_complete,
            dropped_files = summary.dropped_files.len(),
            dropped_complete = summary.dropped_complete,
            "results downloaded"
        );
        Ok(summary)
    }

    async fn retrieve_report(&self, output_dir: &Path, task_id: TaskId) -> Option<PathBuf> {
        debug!(task_id = %task_id, "downloading json report");

        let report = match self.client.task_report(task_id).await {
            Ok(Some(report)) => report,
            Ok(None) => {
                self.step_missing(task_id, Artifact::Report, "no report found");
                return None;
            }
            Err(e) => {
                self.step_failed(task_id, Artifact::Report, &e);
                return None;
            }
        };

        match write_report(output_dir, &report).await {
            Ok(path) => {
                info!(task_id = %task_id, ?path, "report saved");
                self.emit(Event::ReportSaved {
                    task_id,
                    path: path.clone(),
                });
                Some(path)
            }
            Err(e) => {
                self.step_failed(task_id, Artifact::Report, &e);
                None
            }
        }
    }

    /// Returns the dumps written per process and whether every listed process was saved
    async fn retrieve_memory(
        &self,
        output_dir: &Path,
        task_id: TaskId,
    ) -> (BTreeMap<String, PathBuf>, bool) {
        debug!(task_id = %task_id, "downloading process memory");

        let names = match self.client.memory_dump_list(task_id).await {
            Ok(Some(names)) => names,
            Ok(None) => {
                self.step_missing(task_id, Artifact::Memory, "memory listing has no dump files");
                return (BTreeMap::new(), false);
            }
            Err(e) => {
                self.step_failed(task_id, Artifact::Memory, &e);
                return (BTreeMap::new(), false);
            }
        };

        let memory_dir = output_dir.join(MEMORY_DIR);
        if let Err(e) = tokio::fs::create_dir_all(&memory_dir).await {
            self.step_failed(task_id, Artifact::Memory, &e.into());
            return (BTreeMap::new(), false);
        }

        let mut dumps = BTreeMap::new();
        let mut complete = true;
        for process in distinct_process_ids(names.iter().map(String::as_str)) {
            let dest = memory_dir.join(format!("{}.dmp", process));
            match self.save_memory_dump(task_id, &process, &dest).await {
                Ok(bytes) => {
                    info!(task_id = %task_id, process = %process, bytes, "memory dump saved");
                    self.emit(Event::MemoryDumpSaved {
                        task_id,
                        process: process.clone(),
                        path: dest.clone(),
                    });
                    dumps.insert(process, dest);
                }
                Err(e) => {
                    complete = false;
                    self.step_failed(task_id, Artifact::Memory, &e);
                }
            }
        }

        (dumps, complete)
    }

    async fn save_memory_dump(&self, task_id: TaskId, process: &str, dest: &Path) -> Result<u64> {
        self.client
            .memory_dump(task_id, process)
            .await?
            .write_to(dest)
            .await
    }

    /// Returns the files left after extraction and whether download and extraction succeeded
    async fn retrieve_dropped(&self, output_dir: &Path, task_id: TaskId) -> (Vec<PathBuf>, bool) {
        debug!(task_id = %task_id, "downloading dropped files");

        let dropped_dir = output_dir.join(DROPPED_DIR);
        let archive = dropped_dir.join(DROPPED_ARCHIVE);

        let downloaded = match self.client.dropped_files(task_id).await {
            Ok(stream) => stream.write_to(&archive).await,
            Err(e) => Err(e),
        };
        if let Err(e) = downloaded {
            self.step_failed(task_id, Artifact::Dropped, &e);
            return (Vec::new(), false);
        }

        match extract_nested_bundle(&archive, &dropped_dir, &self.config().extraction).await {
            Ok(files) => {
                info!(task_id = %task_id, file_count = files.len(), "dropped files extracted");
                self.emit(Event::DroppedExtracted {
                    task_id,
                    file_count: files.len(),
                });
                (files, true)
            }
            Err(e) => {
                // Whatever was extracted stays on disk, including stray archives
                self.step_failed(task_id, Artifact::Dropped, &e);
                (Vec::new(), false)
            }
        }
    }

    fn step_failed(&self, task_id: TaskId, artifact: Artifact, e: &Error) {
        if e.is_not_found() {
            info!(task_id = %task_id, artifact = %artifact, error = %e, "sandbox has no such artifact");
        } else {
            warn!(
                task_id = %task_id,
                artifact = %artifact,
                code = e.code(),
                error = %e,
                "retrieval step failed"
            );
        }
        self.emit(Event::ArtifactFailed {
            task_id,
            artifact,
            code: e.code().to_string(),
            message: e.to_string(),
        });
    }

    /// The sandbox answered, but without the data this step needs
    fn step_missing(&self, task_id: TaskId, artifact: Artifact, message: &str) {
        error!(task_id = %task_id, artifact = %artifact, "{}", message);
        self.emit(Event::ArtifactFailed {
            task_id,
            artifact,
            code: MISSING_DATA.to_string(),
            message: message.to_string(),
        });
    }
}

/// Write a report as pretty-printed JSON to the lowest unused `report_N.json` in `dir`
///
/// The file is created exclusively, so an existing report is never overwritten.
pub async fn write_report(dir: &Path, report: &Value) -> Result<PathBuf> {
    let path = next_numbered_path(dir, "report", "json")?;
    let content = serde_json::to_vec_pretty(report)?;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await?;
    file.write_all(&content).await?;
    file.flush().await?;

    Ok(path)
}

/// Delete `dir` if present, then create it empty
async fn prepare_output_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!(?dir, "removed previous output directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            error!(?dir, error = %e, "failed to clear output directory");
            return Err(e.into());
        }
    }

    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        error!(?dir, error = %e, "failed to create output directory");
        Error::from(e)
    })
}
