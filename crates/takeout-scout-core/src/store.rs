use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::pairs::MediaPair;
use crate::parts::archive_stem;
use crate::scanner::ScanReport;
use crate::summary::{ArchiveSummary, ContentCounts, FileDetail};
use crate::walker::SourceType;

/// Index file at the store root: absolute source path -> record file name.
pub const INDEX_FILENAME: &str = "discoveries_index.json";
/// Directory under the store root holding one record file per source.
pub const RECORDS_DIRNAME: &str = "takeouts_discovered";
pub const RECORD_EXTENSION: &str = "takeout_scout";

const HASH_PREFIX_LEN: usize = 12;

/// Size and modification time of a source when it was last scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStamp {
    pub size: u64,
    /// Seconds since the Unix epoch, when the platform reports it.
    pub modified: Option<i64>,
}

impl SourceStamp {
    /// Stamp the path as it is on disk now. Directories report size 0.
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = fs::metadata(path)?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);
        let size = if meta.is_dir() { 0 } else { meta.len() };
        Ok(Self { size, modified })
    }
}

fn default_scan_count() -> u64 {
    1
}

/// Durable state for one source path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    pub source_path: String,
    pub source_type: SourceType,
    pub first_discovered: DateTime<Utc>,
    pub last_scanned: DateTime<Utc>,
    #[serde(default = "default_scan_count")]
    pub scan_count: u64,
    pub parts_group: String,
    pub service_guess: String,
    #[serde(flatten)]
    pub counts: ContentCounts,
    #[serde(default)]
    pub source_stamp: Option<SourceStamp>,
    #[serde(default)]
    pub file_details: Vec<FileDetail>,
    #[serde(default)]
    pub media_pairs: Vec<MediaPair>,
    /// User-owned; never written by a scan.
    #[serde(default)]
    pub notes: String,
    /// Keys this version does not know about, written back unchanged.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DiscoveryRecord {
    fn first(report: &ScanReport, now: DateTime<Utc>) -> Self {
        let summary = &report.summary;
        Self {
            source_path: summary.path.clone(),
            source_type: summary.source_type,
            first_discovered: now,
            last_scanned: now,
            scan_count: 1,
            parts_group: summary.parts_group.clone(),
            service_guess: summary.service_guess.clone(),
            counts: summary.counts.clone(),
            source_stamp: report.stamp,
            file_details: report.files.clone(),
            media_pairs: report.media_pairs.clone(),
            notes: String::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Overwrite the scan-derived fields, keeping identity, notes and unknown keys.
    fn apply_rescan(&mut self, report: &ScanReport, now: DateTime<Utc>) {
        let summary = &report.summary;
        self.source_type = summary.source_type;
        self.last_scanned = now;
        self.scan_count += 1;
        self.parts_group = summary.parts_group.clone();
        self.service_guess = summary.service_guess.clone();
        self.counts = summary.counts.clone();
        self.source_stamp = report.stamp;
        self.file_details = report.files.clone();
        self.media_pairs = report.media_pairs.clone();
    }

    /// Summary view of the last scan.
    pub fn summary(&self) -> ArchiveSummary {
        ArchiveSummary {
            path: self.source_path.clone(),
            parts_group: self.parts_group.clone(),
            service_guess: self.service_guess.clone(),
            source_type: self.source_type,
            counts: self.counts.clone(),
        }
    }
}

/// Canonical key for a source path.
///
/// Existing paths are canonicalized. Vanished ones are made absolute lexically
/// so their records can still be found.
pub fn normalize_source_path(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Deterministic record id: sanitized base name plus a SHA-256 prefix of the path.
pub fn record_id(source_path: &str, is_dir: bool) -> String {
    let hash = hex::encode(Sha256::digest(source_path.as_bytes()));
    let name = Path::new(source_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "source".to_string());
    let base = if is_dir { name.as_str() } else { archive_stem(&name) };
    let safe: String = base
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect();
    format!("{safe}_{}", &hash[..HASH_PREFIX_LEN])
}

/// On-disk store of discovery records plus the index that points at them.
pub struct DiscoveryStore {
    root: PathBuf,
    records_dir: PathBuf,
    index_path: PathBuf,
    writer: Mutex<()>,
}

impl DiscoveryStore {
    /// Open (creating if needed) the store under `root`, then repair the index.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let records_dir = root.join(RECORDS_DIRNAME);
        fs::create_dir_all(&records_dir).map_err(|e| StoreError::io(&records_dir, e))?;
        // Same form as scanned source paths, so `is_store_path` can compare them.
        let root = normalize_source_path(&root);
        let records_dir = root.join(RECORDS_DIRNAME);
        let store = Self {
            index_path: root.join(INDEX_FILENAME),
            records_dir,
            root,
            writer: Mutex::new(()),
        };
        store.reconcile()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn records_dir(&self) -> &Path {
        &self.records_dir
    }

    /// True for files the store itself owns: the records folder, the index and
    /// the index's in-flight temp files. Folder scans skip these.
    pub fn is_store_path(&self, path: &Path) -> bool {
        if path.starts_with(&self.records_dir) {
            return true;
        }
        if path.parent() != Some(self.root.as_path()) {
            return false;
        }
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n == INDEX_FILENAME || n.starts_with(&format!(".{INDEX_FILENAME}")))
    }

    /// Current index: absolute source path -> record file name.
    pub fn index(&self) -> Result<BTreeMap<String, String>, StoreError> {
        if !self.index_path.exists() {
            return Ok(BTreeMap::new());
        }
        read_json(&self.index_path)
    }

    /// Existing record for `source`, or `None` if it was never scanned.
    pub fn load(&self, source: &Path) -> Result<Option<DiscoveryRecord>, StoreError> {
        let key = normalize_source_path(source).to_string_lossy().into_owned();
        self.load_key(&key)
    }

    fn load_key(&self, key: &str) -> Result<Option<DiscoveryRecord>, StoreError> {
        let index = self.index()?;
        let Some(file_name) = index.get(key) else {
            return Ok(None);
        };
        let record = self.read_record(file_name)?;
        if record.source_path != key {
            return Err(StoreError::Mismatch {
                key: key.to_string(),
                found: record.source_path,
            });
        }
        Ok(Some(record))
    }

    /// Every indexed record, sorted by source path. Unreadable records are skipped.
    pub fn list_all(&self) -> Result<Vec<(String, DiscoveryRecord)>, StoreError> {
        let index = self.index()?;
        let mut out = Vec::with_capacity(index.len());
        for (key, file_name) in index {
            match self.read_record(&file_name) {
                Ok(record) if record.source_path == key => out.push((key, record)),
                Ok(record) => warn!(
                    key = %key,
                    found = %record.source_path,
                    "Skipping record that declares another source path"
                ),
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable discovery record"),
            }
        }
        Ok(out)
    }

    /// Create or merge the record for a finished scan.
    ///
    /// The record file is written before the index, and both writes are atomic
    /// renames, so the index never points at a missing or half-written record.
    pub fn save(&self, report: &ScanReport) -> Result<DiscoveryRecord, StoreError> {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let key = report.summary.path.clone();
        let now = Utc::now();
        let mut index = self.index()?;

        let (file_name, record) = match index.get(&key) {
            Some(file_name) => {
                let record = match self.read_record(file_name) {
                    Ok(mut existing) if existing.source_path == key => {
                        existing.apply_rescan(report, now);
                        existing
                    }
                    Ok(_) | Err(_) => {
                        warn!(key = %key, file = %file_name, "Replacing unreadable discovery record");
                        DiscoveryRecord::first(report, now)
                    }
                };
                (file_name.clone(), record)
            }
            None => {
                let is_dir = report.summary.source_type == SourceType::Directory;
                let file_name = format!("{}.{RECORD_EXTENSION}", record_id(&key, is_dir));
                (file_name, DiscoveryRecord::first(report, now))
            }
        };

        write_json_atomic(&self.records_dir.join(&file_name), &record)?;
        if index.get(&key) != Some(&file_name) {
            index.insert(key.clone(), file_name.clone());
            write_json_atomic(&self.index_path, &index)?;
        }

        info!(
            source = %key,
            record = %file_name,
            scan_count = record.scan_count,
            "Saved discovery record"
        );
        Ok(record)
    }

    /// Explicitly drop the record for `source`. Returns false if none existed.
    ///
    /// The index entry goes first; a crash before the file is removed leaves an
    /// orphan that the next `open` re-indexes, so the forget must be repeated.
    pub fn forget(&self, source: &Path) -> Result<bool, StoreError> {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let key = normalize_source_path(source).to_string_lossy().into_owned();
        let mut index = self.index()?;
        let Some(file_name) = index.remove(&key) else {
            return Ok(false);
        };
        write_json_atomic(&self.index_path, &index)?;

        let record_path = self.records_dir.join(&file_name);
        match fs::remove_file(&record_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(record_path, e)),
        }
        info!(source = %key, record = %file_name, "Forgot discovery record");
        Ok(true)
    }

    fn read_record(&self, file_name: &str) -> Result<DiscoveryRecord, StoreError> {
        read_json(&self.records_dir.join(file_name))
    }

    /// Bring the index back in line with the record files on disk.
    ///
    /// Readable records missing from the index are added; index entries whose
    /// record file is gone are dropped. A malformed index is rebuilt from the
    /// records.
    fn reconcile(&self) -> Result<(), StoreError> {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut dirty = false;
        let mut index = match self.index() {
            Ok(index) => index,
            Err(e @ StoreError::Json { .. }) => {
                warn!(error = %e, "Discoveries index is malformed, rebuilding it");
                dirty = true;
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };

        let before = index.len();
        index.retain(|key, file_name| {
            let keep = self.records_dir.join(file_name.as_str()).is_file();
            if !keep {
                warn!(source = %key, record = %file_name, "Dropping index entry without a record file");
            }
            keep
        });
        dirty |= index.len() != before;

        let indexed: std::collections::HashSet<String> = index.values().cloned().collect();
        let mut orphans = Vec::new();
        let entries =
            fs::read_dir(&self.records_dir).map_err(|e| StoreError::io(&self.records_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.records_dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !indexed.contains(&file_name) {
                orphans.push(file_name);
            }
        }
        orphans.sort();

        for file_name in orphans {
            match self.read_record(&file_name) {
                Ok(record) if !index.contains_key(&record.source_path) => {
                    warn!(
                        source = %record.source_path,
                        record = %file_name,
                        "Re-indexing orphaned discovery record"
                    );
                    index.insert(record.source_path, file_name);
                    dirty = true;
                }
                Ok(record) => warn!(
                    source = %record.source_path,
                    record = %file_name,
                    "Ignoring duplicate record for an already indexed source"
                ),
                Err(e) => warn!(record = %file_name, error = %e, "Ignoring unreadable record file"),
            }
        }

        if dirty {
            write_json_atomic(&self.index_path, &index)?;
        }
        Ok(())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| StoreError::json(path, e))
}

/// Write to a uniquely named temp file in the same directory, sync it, then
/// rename it over the target.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| StoreError::io(dir, e))?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)
            .map_err(|e| StoreError::json(path, e))?;
        writer.flush().map_err(|e| StoreError::io(path, e))?;
    }
    temp.as_file().sync_all().map_err(|e| StoreError::io(path, e))?;

    temp.persist(path).map_err(|e| StoreError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::SummaryBuilder;
    use tempfile::tempdir;

    fn report(path: &str, photos: u64) -> ScanReport {
        let mut summary = SummaryBuilder::new().finish(
            path.to_string(),
            "group".to_string(),
            SourceType::Zip,
            100,
            &[],
        );
        summary.counts.photos = photos;
        summary.counts.file_count = photos;
        ScanReport {
            summary,
            files: Vec::new(),
            media_pairs: Vec::new(),
            stamp: Some(SourceStamp {
                size: 100,
                modified: Some(1_700_000_000),
            }),
        }
    }

    #[test]
    fn test_record_id_is_stable_and_sanitized() {
        let a = record_id("/data/Takeout-001.zip", false);
        assert_eq!(a, record_id("/data/Takeout-001.zip", false));
        assert!(a.starts_with("Takeout-001_"));
        assert_eq!(a.len(), "Takeout-001_".len() + HASH_PREFIX_LEN);
        assert_ne!(a, record_id("/other/Takeout-001.zip", false));

        assert!(record_id("/d/we?ird:name", true).starts_with("we_ird_name_"));
        assert!(record_id("/d/photos.tar.gz", false).starts_with("photos_"));
    }

    #[test]
    fn test_save_then_rescan_merges() {
        let dir = tempdir().unwrap();
        let store = DiscoveryStore::open(dir.path()).unwrap();

        let first = store.save(&report("/t/a.zip", 3)).unwrap();
        assert_eq!(first.scan_count, 1);

        let second = store.save(&report("/t/a.zip", 5)).unwrap();
        assert_eq!(second.scan_count, 2);
        assert_eq!(second.first_discovered, first.first_discovered);
        assert_eq!(second.counts.photos, 5);

        let loaded = store.load_key("/t/a.zip").unwrap().unwrap();
        assert_eq!(loaded, second);
        assert_eq!(store.index().unwrap().len(), 1);
    }

    #[test]
    fn test_load_unknown_is_none() {
        let dir = tempdir().unwrap();
        let store = DiscoveryStore::open(dir.path()).unwrap();
        assert!(store.load_key("/never/scanned.zip").unwrap().is_none());
    }

    #[test]
    fn test_unknown_keys_round_trip() {
        let dir = tempdir().unwrap();
        let store = DiscoveryStore::open(dir.path()).unwrap();
        store.save(&report("/t/a.zip", 1)).unwrap();

        let file_name = store.index().unwrap()["/t/a.zip"].clone();
        let path = store.records_dir().join(&file_name);
        let mut raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        raw["future_field"] = serde_json::json!({"nested": [1, 2, 3]});
        raw["notes"] = Value::from("keep me");
        fs::write(&path, serde_json::to_string_pretty(&raw).unwrap()).unwrap();

        let rescanned = store.save(&report("/t/a.zip", 2)).unwrap();
        assert_eq!(rescanned.notes, "keep me");
        assert_eq!(rescanned.extra["future_field"]["nested"][2], 3);

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["future_field"]["nested"][0], 1);
        assert_eq!(raw["photos"], 2);
    }

    #[test]
    fn test_forget_removes_index_entry_and_file() {
        let dir = tempdir().unwrap();
        let store = DiscoveryStore::open(dir.path()).unwrap();
        let source = dir.path().join("gone.zip");
        let key = normalize_source_path(&source).to_string_lossy().into_owned();
        store.save(&report(&key, 1)).unwrap();
        let file_name = store.index().unwrap()[&key].clone();

        assert!(store.forget(&source).unwrap());
        assert!(store.index().unwrap().is_empty());
        assert!(!store.records_dir().join(file_name).exists());
        assert!(!store.forget(&source).unwrap());
    }

    #[test]
    fn test_open_rebuilds_malformed_index() {
        let dir = tempdir().unwrap();
        {
            let store = DiscoveryStore::open(dir.path()).unwrap();
            store.save(&report("/t/a.zip", 1)).unwrap();
            store.save(&report("/t/b.zip", 1)).unwrap();
        }
        fs::write(dir.path().join(INDEX_FILENAME), b"{ not json").unwrap();

        let store = DiscoveryStore::open(dir.path()).unwrap();
        let index = store.index().unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.contains_key("/t/a.zip"));
    }

    #[test]
    fn test_open_drops_dangling_entries() {
        let dir = tempdir().unwrap();
        let store = DiscoveryStore::open(dir.path()).unwrap();
        store.save(&report("/t/a.zip", 1)).unwrap();
        let file_name = store.index().unwrap()["/t/a.zip"].clone();
        fs::remove_file(store.records_dir().join(file_name)).unwrap();

        let store = DiscoveryStore::open(dir.path()).unwrap();
        assert!(store.index().unwrap().is_empty());
    }

    #[test]
    fn test_store_owned_paths() {
        let dir = tempdir().unwrap();
        let store = DiscoveryStore::open(dir.path()).unwrap();
        let root = store.root().to_path_buf();

        assert!(store.is_store_path(&root.join(INDEX_FILENAME)));
        assert!(store.is_store_path(&root.join(format!(".{INDEX_FILENAME}.a1b2.tmp"))));
        assert!(store.is_store_path(store.records_dir()));
        assert!(store.is_store_path(&store.records_dir().join("x_0123456789ab.takeout_scout")));

        assert!(!store.is_store_path(&root.join("Google Photos/a.jpg")));
        assert!(!store.is_store_path(&root.join("sub").join(INDEX_FILENAME)));
    }

    #[test]
    fn test_writes_leave_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = DiscoveryStore::open(dir.path()).unwrap();
        store.save(&report("/t/a.zip", 1)).unwrap();
        store.save(&report("/t/a.zip", 2)).unwrap();

        let names = |path: &Path| -> Vec<String> {
            fs::read_dir(path)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        };
        assert!(names(store.root()).iter().all(|n| !n.ends_with(".tmp")));
        let records = names(store.records_dir());
        assert_eq!(records.len(), 1);
        assert!(records[0].ends_with(&format!(".{RECORD_EXTENSION}")));
    }
}
