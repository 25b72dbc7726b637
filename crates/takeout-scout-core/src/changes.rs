use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::store::SourceStamp;
use crate::summary::ContentCounts;

/// Difference between a scan batch and the index as it was before the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeReport {
    /// In the batch, never recorded before.
    pub new: BTreeSet<String>,
    /// Recorded before, absent from the batch.
    pub missing: BTreeSet<String>,
    /// Recorded before with a size or mtime that no longer matches the source.
    pub changed: BTreeSet<String>,
}

impl ChangeReport {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.missing.is_empty() && self.changed.is_empty()
    }
}

/// Compare batch sources with a pre-batch snapshot of the index.
///
/// Both maps go from normalized source path to stamp. A snapshot entry without
/// a stamp is never reported as changed.
pub fn detect_changes(
    batch: &BTreeMap<String, Option<SourceStamp>>,
    snapshot: &BTreeMap<String, Option<SourceStamp>>,
) -> ChangeReport {
    let mut report = ChangeReport::default();
    for (path, current) in batch {
        match snapshot.get(path) {
            None => {
                report.new.insert(path.clone());
            }
            Some(Some(previous)) if current.as_ref() != Some(previous) => {
                report.changed.insert(path.clone());
            }
            Some(_) => {}
        }
    }
    report.missing = snapshot
        .keys()
        .filter(|path| !batch.contains_key(*path))
        .cloned()
        .collect();
    report
}

/// Per-source content change between the prior record and a fresh scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentDelta {
    pub path: String,
    pub file_count: i64,
    pub photos: i64,
    pub videos: i64,
    pub json_sidecars: i64,
    pub other: i64,
    pub total_bytes: i64,
}

fn diff(after: u64, before: u64) -> i64 {
    after as i64 - before as i64
}

impl ContentDelta {
    pub fn between(path: &str, before: &ContentCounts, after: &ContentCounts) -> Self {
        Self {
            path: path.to_string(),
            file_count: diff(after.file_count, before.file_count),
            photos: diff(after.photos, before.photos),
            videos: diff(after.videos, before.videos),
            json_sidecars: diff(after.json_sidecars, before.json_sidecars),
            other: diff(after.other, before.other),
            total_bytes: diff(after.total_bytes, before.total_bytes),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.file_count == 0
            && self.photos == 0
            && self.videos == 0
            && self.json_sidecars == 0
            && self.other == 0
            && self.total_bytes == 0
    }
}
