use crate::error::{ArchiveError, Error, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Names treated as first-level zip archives inside an extracted bundle
const FIRST_LEVEL_ZIP_PATTERN: &str = r"^[0-9A-Za-z.]+\.zip$";

/// Archive extractor for the zip files nested inside a dropped-files bundle
pub struct ZipExtractor;

impl ZipExtractor {
    /// Detect first-level zip archives among the immediate entries of a directory
    ///
    /// Only regular files whose whole name is alphanumerics and dots followed by `.zip`
    /// qualify. The result is sorted so extraction order (and therefore last-write-wins
    /// collisions) is deterministic.
    pub fn detect_first_level_zips(dir: &Path) -> Result<Vec<PathBuf>> {
        debug!(?dir, "detecting first-level zip archives");

        let pattern = Regex::new(FIRST_LEVEL_ZIP_PATTERN)
            .map_err(|e| Error::Other(format!("invalid zip pattern: {}", e)))?;

        let mut archives = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();

            if !path.is_file() {
                continue;
            }

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if pattern.is_match(name) {
                archives.push(path);
            }
        }

        archives.sort();
        debug!("found {} first-level zip archive(s)", archives.len());
        Ok(archives)
    }

    /// Extract a single zip entry to disk, creating directories as needed
    fn extract_zip_entry(
        mut file: zip::read::ZipFile,
        dest_path: &Path,
        archive_path: &Path,
    ) -> Result<Option<PathBuf>> {
        let file_path = match file.enclosed_name() {
            Some(path) => dest_path.join(path),
            None => {
                warn!(?archive_path, name = file.name(), "skipping zip entry with unsafe path");
                return Ok(None);
            }
        };

        if file.is_dir() {
            std::fs::create_dir_all(&file_path)?;
            return Ok(None);
        }

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut outfile = std::fs::File::create(&file_path)?;
        std::io::copy(&mut file, &mut outfile).map_err(|e| {
            Error::Archive(ArchiveError::NestedZip {
                archive: archive_path.to_path_buf(),
                reason: format!("failed to extract {}: {}", file_path.display(), e),
            })
        })?;

        Ok(Some(file_path))
    }

    /// Extract every entry of a zip archive into `dest_path`
    ///
    /// Existing files at the same paths are overwritten.
    pub fn extract(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>> {
        debug!(?archive_path, ?dest_path, "extracting zip archive");

        std::fs::create_dir_all(dest_path)?;

        let nested_error = |reason: String| {
            Error::Archive(ArchiveError::NestedZip {
                archive: archive_path.to_path_buf(),
                reason,
            })
        };

        let file = std::fs::File::open(archive_path)
            .map_err(|e| nested_error(format!("failed to open zip archive: {}", e)))?;

        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| nested_error(format!("failed to read zip archive: {}", e)))?;

        let mut extracted_files = Vec::new();
        for i in 0..archive.len() {
            let entry = archive
                .by_index(i)
                .map_err(|e| nested_error(format!("failed to read zip entry {}: {}", i, e)))?;

            if let Some(file_path) = Self::extract_zip_entry(entry, dest_path, archive_path)? {
                extracted_files.push(file_path);
            }
        }

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "zip extraction successful"
        );

        Ok(extracted_files)
    }
}
