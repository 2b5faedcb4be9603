use crate::error::{ArchiveError, Error, Result};
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Extract a tar archive with bzip2 compression into `dest_path`
///
/// Entries are unpacked one by one; entries whose path would escape `dest_path` are
/// skipped with a warning. Returns the regular files that were written.
pub fn extract_tar_bz2(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>> {
    debug!(?archive_path, ?dest_path, "extracting tar.bz2 archive");

    let outer_error = |reason: String| {
        Error::Archive(ArchiveError::OuterArchive {
            archive: archive_path.to_path_buf(),
            reason,
        })
    };

    std::fs::create_dir_all(dest_path)?;

    let file = File::open(archive_path)
        .map_err(|e| outer_error(format!("failed to open archive: {}", e)))?;
    let mut archive = tar::Archive::new(bzip2::read::BzDecoder::new(file));

    let entries = archive
        .entries()
        .map_err(|e| outer_error(format!("failed to read archive: {}", e)))?;

    let mut extracted_files = Vec::new();
    for entry in entries {
        let mut entry = entry.map_err(|e| outer_error(format!("failed to read entry: {}", e)))?;

        let entry_path = entry
            .path()
            .map_err(|e| outer_error(format!("invalid entry path: {}", e)))?
            .into_owned();
        let is_file = entry.header().entry_type().is_file();

        let unpacked = entry.unpack_in(dest_path).map_err(|e| {
            outer_error(format!("failed to unpack {}: {}", entry_path.display(), e))
        })?;

        if !unpacked {
            warn!(?archive_path, entry = ?entry_path, "skipping tar entry outside the destination");
            continue;
        }

        if is_file {
            extracted_files.push(dest_path.join(unpacked_relative_path(&entry_path)));
        }
    }

    info!(
        ?archive_path,
        extracted_count = extracted_files.len(),
        "tar.bz2 extraction successful"
    );

    Ok(extracted_files)
}

/// Where `unpack_in` places an entry relative to the destination
///
/// Root, prefix and `.` components are dropped; `..` never reaches here since such
/// entries are refused.
fn unpacked_relative_path(entry_path: &Path) -> PathBuf {
    entry_path
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}
