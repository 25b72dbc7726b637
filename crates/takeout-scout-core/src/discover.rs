use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::ScanError;
use crate::store::RECORDS_DIRNAME;

/// Child folder names that mark an extracted Takeout export.
const TAKEOUT_MARKER_DIRS: &[&str] = &["Google Photos", "Google Drive", "Google Maps"];

fn is_archive_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".zip") || lower.ends_with(".tgz") || lower.ends_with(".tar.gz")
}

/// The store's own records folder also contains "takeout" and never counts.
fn is_takeout_dir_name(name: &str) -> bool {
    name != RECORDS_DIRNAME && name.to_lowercase().contains("takeout")
}

/// Candidate sources under `root`, sorted and without duplicates.
///
/// Archives are found at any depth. The root itself is included when it looks
/// like an extracted export, and so is every direct child folder with
/// "takeout" in its name. A file root is returned as-is.
pub fn find_sources(root: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let meta = fs::metadata(root).map_err(|e| ScanError::from_io(root, e))?;
    if !meta.is_dir() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut found = BTreeSet::new();
    let children = fs::read_dir(root).map_err(|e| ScanError::from_io(root, e))?;
    let mut root_is_takeout = false;
    for child in children.flatten() {
        if !child.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let name = child.file_name().to_string_lossy().into_owned();
        if is_takeout_dir_name(&name) {
            root_is_takeout = true;
            found.insert(child.path());
        } else if TAKEOUT_MARKER_DIRS.contains(&name.as_str()) {
            root_is_takeout = true;
        }
    }
    if root_is_takeout {
        info!(root = %root.display(), "Root folder appears to be a Takeout directory");
        found.insert(root.to_path_buf());
    }

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable path while finding sources");
                continue;
            }
        };
        if entry.file_type().is_file() && is_archive_name(&entry.file_name().to_string_lossy()) {
            found.insert(entry.into_path());
        }
    }

    Ok(found.into_iter().collect())
}
