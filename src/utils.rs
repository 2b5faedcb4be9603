//! Utility functions for file naming and dump descriptor parsing

use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Maximum number of indices tried when looking for a free numbered filename
const MAX_NUMBERED_ATTEMPTS: u32 = 9999;

/// Get the lowest-numbered path `<dir>/<stem>_<N>.<ext>` that does not exist yet
///
/// Existing files are never returned, so repeated calls on the same directory never
/// overwrite an earlier file.
///
/// # Examples
///
/// ```
/// use cuckoo_dl::utils::next_numbered_path;
/// use std::path::Path;
///
/// let dir = std::env::temp_dir().join("cuckoo-dl-doc-does-not-exist");
/// let path = next_numbered_path(&dir, "report", "json").unwrap();
/// assert_eq!(path, dir.join("report_0.json"));
/// ```
pub fn next_numbered_path(dir: &Path, stem: &str, extension: &str) -> Result<PathBuf> {
    for i in 0..=MAX_NUMBERED_ATTEMPTS {
        let candidate = dir.join(format!("{}_{}.{}", stem, i, extension));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(Error::Other(format!(
        "no free {}_N.{} name in {} after {} attempts",
        stem,
        extension,
        dir.display(),
        MAX_NUMBERED_ATTEMPTS
    )))
}

/// Extract the process identifier from a memory dump descriptor
///
/// The sandbox names dumps `<pid>-<hash><ext>` (e.g. `2656-7e47a23408e3606e.dmp`);
/// the pid is everything before the first `-`. Returns `None` for an empty pid or a
/// pid that could escape the memory directory when used as a filename.
///
/// # Examples
///
/// ```
/// use cuckoo_dl::utils::process_id_from_dump_name;
///
/// assert_eq!(process_id_from_dump_name("2656-7e47a23408e3606e.dll_"), Some("2656"));
/// assert_eq!(process_id_from_dump_name("1234.dmp"), Some("1234.dmp"));
/// assert_eq!(process_id_from_dump_name("-abc.dmp"), None);
/// ```
#[must_use]
pub fn process_id_from_dump_name(name: &str) -> Option<&str> {
    let pid = name.split('-').next()?.trim();
    if pid.is_empty() || pid == "." || pid == ".." || pid.contains(['/', '\\']) {
        return None;
    }
    Some(pid)
}

/// Collect the distinct process identifiers from a list of dump descriptors, sorted
pub fn distinct_process_ids<'a>(names: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    names
        .into_iter()
        .filter_map(|name| {
            let pid = process_id_from_dump_name(name);
            if pid.is_none() {
                tracing::warn!(descriptor = name, "ignoring malformed memory dump descriptor");
            }
            pid
        })
        .map(str::to_string)
        .collect()
}
