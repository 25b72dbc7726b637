pub mod cancel;
pub mod changes;
pub mod classify;
pub mod discover;
pub mod error;
pub mod metadata;
pub mod pairs;
pub mod parts;
pub mod scanner;
pub mod service;
pub mod store;
pub mod summary;
pub mod walker;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

pub use cancel::{CancellationToken, CancelledError};
pub use changes::{detect_changes, ChangeReport, ContentDelta};
pub use classify::Category;
pub use discover::find_sources;
pub use error::{Result, ScanError, ScoutError, StoreError};
pub use metadata::PhotoMetadata;
pub use pairs::{MediaPair, PairType};
pub use scanner::ScanReport;
pub use store::{DiscoveryRecord, DiscoveryStore, SourceStamp};
pub use summary::{summarize_groups, ArchiveSummary, ContentCounts, FileDetail, GroupSummary};
pub use walker::SourceType;

fn default_true() -> bool {
    true
}

fn default_max_metadata_bytes() -> u64 {
    32 * 1024 * 1024
}

/// Knobs for one scan or batch. Every field has a default, so a partial JSON
/// options file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    #[serde(default = "default_true")]
    pub save_discovery: bool,
    /// Return per-entry details in the report. Saved records always carry them.
    #[serde(default = "default_true")]
    pub keep_file_details: bool,
    /// Photo bytes read for metadata, from the start of each entry.
    #[serde(default = "default_max_metadata_bytes")]
    pub max_metadata_bytes: u64,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Skip sniffing and treat every source as this type.
    #[serde(default)]
    pub source_type: Option<SourceType>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            save_discovery: true,
            keep_file_details: true,
            max_metadata_bytes: default_max_metadata_bytes(),
            follow_symlinks: false,
            source_type: None,
        }
    }
}

/// Control options for scan execution (cancellation).
#[derive(Debug, Clone, Default)]
pub struct ScanControl {
    pub cancel_token: Option<CancellationToken>,
}

impl ScanControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    fn check(&self) -> std::result::Result<(), ScanError> {
        match &self.cancel_token {
            Some(token) => token.check().map_err(|_| ScanError::Cancelled),
            None => Ok(()),
        }
    }
}

/// Type alias for progress callback: (stage, current, total, message).
/// A total of 0 means the source cannot say how many entries it has.
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a;

/// Throttled progress reporter: emits at most every 200ms, plus completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback<'a>,
    last_emit: Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback<'a>) -> Self {
        let start = Instant::now()
            .checked_sub(Duration::from_secs(1))
            .unwrap_or_else(Instant::now);
        Self {
            inner,
            last_emit: Mutex::new(start),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = total != 0 && current + 1 >= total;
        if !is_done {
            let mut last = self.last_emit.lock().unwrap_or_else(|e| e.into_inner());
            if last.elapsed() < Duration::from_millis(200) {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }

    /// Unconditional final emit for a stage.
    pub fn finish(&self, stage: &str, count: u64, message: &str) {
        (self.inner)(stage, count, count, message);
    }
}

/// One source of a batch that could not be scanned or saved.
#[derive(Debug)]
pub struct SourceFailure {
    pub path: PathBuf,
    pub error: ScoutError,
}

/// Result of [`scan_batch`]: per-source outcomes plus the batch-level reports.
#[derive(Debug)]
pub struct BatchOutcome {
    /// One entry per input source, in input order.
    pub results: Vec<std::result::Result<ScanReport, SourceFailure>>,
    pub changes: ChangeReport,
    /// Content deltas for sources that had a prior record.
    pub deltas: Vec<ContentDelta>,
    pub groups: Vec<GroupSummary>,
}

impl BatchOutcome {
    pub fn reports(&self) -> impl Iterator<Item = &ScanReport> {
        self.results.iter().filter_map(|r| r.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &SourceFailure> {
        self.results.iter().filter_map(|r| r.as_ref().err())
    }
}

/// Scan one source and, unless disabled, save it to the store.
///
/// A failure (including cancellation) leaves any prior record untouched. When
/// the store lives inside a scanned folder, its own files are not counted.
pub fn scan(
    source: &Path,
    options: &ScanOptions,
    store: &DiscoveryStore,
    control: &ScanControl,
    progress_callback: &ProgressCallback<'_>,
) -> Result<ScanReport> {
    let tp = ThrottledProgress::new(progress_callback);
    scan_with(source, options, store, control, &tp)
}

fn scan_with(
    source: &Path,
    options: &ScanOptions,
    store: &DiscoveryStore,
    control: &ScanControl,
    tp: &ThrottledProgress<'_>,
) -> Result<ScanReport> {
    control.check()?;
    let skip = |path: &Path| store.is_store_path(path);
    let mut report = scanner::scan_source(source, options, Some(&skip), control, tp)?;

    control.check()?;
    if options.save_discovery {
        store.save(&report)?;
    }
    if !options.keep_file_details {
        report.files.clear();
    }
    Ok(report)
}

/// Current stamps for a batch, keyed the same way the store keys records.
fn batch_stamps(sources: &[PathBuf]) -> BTreeMap<String, Option<SourceStamp>> {
    sources
        .iter()
        .map(|s| {
            let key = store::normalize_source_path(s);
            let stamp = SourceStamp::of(&key).ok();
            (key.to_string_lossy().into_owned(), stamp)
        })
        .collect()
}

fn snapshot_stamps(
    snapshot: &[(String, DiscoveryRecord)],
) -> BTreeMap<String, Option<SourceStamp>> {
    snapshot
        .iter()
        .map(|(path, record)| (path.clone(), record.source_stamp))
        .collect()
}

/// Report new, missing and changed sources without scanning anything.
pub fn compare_against_index(
    store: &DiscoveryStore,
    sources: &[PathBuf],
) -> std::result::Result<ChangeReport, StoreError> {
    let snapshot = store.list_all()?;
    Ok(detect_changes(
        &batch_stamps(sources),
        &snapshot_stamps(&snapshot),
    ))
}

/// Scan every source concurrently, then compare against the pre-batch index.
///
/// A failing source never stops the others. The only batch-level error is an
/// index that cannot be read before the batch starts.
pub fn scan_batch(
    sources: &[PathBuf],
    options: &ScanOptions,
    store: &DiscoveryStore,
    control: &ScanControl,
    progress_callback: &ProgressCallback<'_>,
) -> std::result::Result<BatchOutcome, StoreError> {
    let snapshot = store.list_all()?;
    let changes = detect_changes(&batch_stamps(sources), &snapshot_stamps(&snapshot));
    let tp = ThrottledProgress::new(progress_callback);

    let results: Vec<_> = sources
        .par_iter()
        .map(|source| {
            scan_with(source, options, store, control, &tp).map_err(|error| {
                if !error.is_cancelled() {
                    tracing::error!(source = %source.display(), error = %error, "Source scan failed");
                }
                SourceFailure {
                    path: source.clone(),
                    error,
                }
            })
        })
        .collect();

    let prior: BTreeMap<&str, &DiscoveryRecord> =
        snapshot.iter().map(|(k, r)| (k.as_str(), r)).collect();
    let deltas = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .filter_map(|report| {
            prior.get(report.source_path()).map(|record| {
                ContentDelta::between(report.source_path(), &record.counts, &report.summary.counts)
            })
        })
        .collect();

    let summaries: Vec<ArchiveSummary> = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|report| report.summary.clone())
        .collect();
    let groups = summarize_groups(&summaries);

    info!(
        sources = sources.len(),
        failed = results.iter().filter(|r| r.is_err()).count(),
        new = changes.new.len(),
        missing = changes.missing.len(),
        changed = changes.changed.len(),
        "Batch scan finished"
    );

    Ok(BatchOutcome {
        results,
        changes,
        deltas,
        groups,
    })
}
