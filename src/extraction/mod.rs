//! Nested archive extraction for dropped-files bundles
//!
//! The sandbox ships dropped files as a tar archive with bzip2 compression whose members
//! may themselves be zip archives. This module unpacks the outer archive, unpacks every
//! first-level zip into the same directory, then removes the intermediate archives so only
//! the payload files remain.

mod tar;
mod zip;


// Re-exports
pub use tar::extract_tar_bz2;
pub use zip::ZipExtractor;

use crate::config::ExtractionConfig;
use crate::error::{ArchiveError, Error, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

/// Fully materialize a two-level bundle into `dest_path`
///
/// 1. Unpack the outer tar/bzip2 archive into `dest_path`.
/// 2. Find the first-level zips among the immediate entries of `dest_path`.
/// 3. Unpack each zip into `dest_path` (flat merge, last write wins).
/// 4. Remove the zips and the outer archive (when `config.remove_archives` is set).
///
/// The first failure aborts the remaining steps: files already written stay, and
/// intermediate archives are not removed.
///
/// # Returns
/// The extracted files still present after cleanup, sorted.
pub async fn extract_nested_bundle(
    archive_path: &Path,
    dest_path: &Path,
    config: &ExtractionConfig,
) -> Result<Vec<PathBuf>> {
    let archive_owned = archive_path.to_path_buf();
    let dest_owned = dest_path.to_path_buf();
    let config_owned = config.clone();

    spawn_blocking(move || extract_nested_bundle_blocking(&archive_owned, &dest_owned, &config_owned))
        .await
        .map_err(|e| {
            Error::Archive(ArchiveError::OuterArchive {
                archive: archive_path.to_path_buf(),
                reason: format!("extraction task panicked: {}", e),
            })
        })?
}

/// Run [`extract_nested_bundle`] and contain any failure
///
/// A failure is logged as a warning and reported as `None`; it never reaches the caller
/// as an error. Stray archives may remain on disk after a failure.
pub async fn extract_nested_bundle_contained(
    archive_path: &Path,
    dest_path: &Path,
    config: &ExtractionConfig,
) -> Option<Vec<PathBuf>> {
    match extract_nested_bundle(archive_path, dest_path, config).await {
        Ok(files) => Some(files),
        Err(e) => {
            warn!(
                ?archive_path,
                error = %e,
                "problem extracting archives, leaving partial results in place"
            );
            None
        }
    }
}

fn extract_nested_bundle_blocking(
    archive_path: &Path,
    dest_path: &Path,
    config: &ExtractionConfig,
) -> Result<Vec<PathBuf>> {
    let mut files: BTreeSet<PathBuf> = extract_tar_bz2(archive_path, dest_path)?
        .into_iter()
        .collect();

    let zips = ZipExtractor::detect_first_level_zips(dest_path)?;
    for zip in &zips {
        info!(?zip, "extracting first-level zip");
        files.extend(ZipExtractor::extract(zip, dest_path)?);
    }

    if !config.remove_archives {
        debug!(?archive_path, "keeping intermediate archives");
        return Ok(files.into_iter().collect());
    }

    for path in zips.iter().map(PathBuf::as_path).chain([archive_path]) {
        std::fs::remove_file(path).map_err(|e| {
            Error::Archive(ArchiveError::Cleanup {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        })?;
        debug!(?path, "removed intermediate archive");
        files.remove(path);
    }

    Ok(files.into_iter().collect())
}
