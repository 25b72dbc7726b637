use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classify::{classify, extension_of, Category};
use crate::metadata::PhotoMetadata;
use crate::pairs::{MediaPair, PairType};
use crate::service::{ServiceGuesser, UNKNOWN_SERVICE};
use crate::walker::SourceType;

/// Counters shared by per-source and per-group summaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentCounts {
    pub file_count: u64,
    pub photos: u64,
    pub videos: u64,
    pub json_sidecars: u64,
    pub other: u64,
    /// Sum of uncompressed entry sizes.
    pub total_bytes: u64,
    /// On-disk footprint of the source.
    pub compressed_size: u64,
    pub photos_with_exif: u64,
    pub photos_with_gps: u64,
    pub photos_with_datetime: u64,
    pub photos_checked: u64,
    pub live_photos: u64,
    pub photo_json_pairs: u64,
    /// Entries whose header or photo payload could not be read. Non-zero means
    /// the listing or its metadata counts are incomplete.
    pub unreadable_entries: u64,
}

impl ContentCounts {
    /// Count one entry. Metadata counters move only for checked photos.
    pub fn add_entry(&mut self, category: Category, size: u64, metadata: Option<&PhotoMetadata>) {
        self.file_count += 1;
        self.total_bytes += size;
        match category {
            Category::Photo => {
                self.photos += 1;
                if let Some(meta) = metadata {
                    self.photos_checked += 1;
                    self.photos_with_exif += u64::from(meta.has_exif);
                    self.photos_with_gps += u64::from(meta.has_gps);
                    self.photos_with_datetime += u64::from(meta.has_datetime);
                }
            }
            Category::Video => self.videos += 1,
            Category::JsonSidecar => self.json_sidecars += 1,
            Category::Other => self.other += 1,
        }
    }

    pub fn add_pairs(&mut self, pairs: &[MediaPair]) {
        for pair in pairs {
            match pair.pair_type {
                PairType::LivePhoto => self.live_photos += 1,
                PairType::PhotoJson => self.photo_json_pairs += 1,
            }
        }
    }

    pub fn merge(&mut self, other: &ContentCounts) {
        self.file_count += other.file_count;
        self.photos += other.photos;
        self.videos += other.videos;
        self.json_sidecars += other.json_sidecars;
        self.other += other.other;
        self.total_bytes += other.total_bytes;
        self.compressed_size += other.compressed_size;
        self.photos_with_exif += other.photos_with_exif;
        self.photos_with_gps += other.photos_with_gps;
        self.photos_with_datetime += other.photos_with_datetime;
        self.photos_checked += other.photos_checked;
        self.live_photos += other.live_photos;
        self.photo_json_pairs += other.photo_json_pairs;
        self.unreadable_entries += other.unreadable_entries;
    }

    /// Sum of the per-category counters; always equals `file_count`.
    pub fn category_total(&self) -> u64 {
        self.photos + self.videos + self.json_sidecars + self.other
    }
}

/// One entry of a source, as kept in a discovery record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDetail {
    pub path: String,
    pub size: u64,
    pub file_type: Category,
    pub extension: String,
    #[serde(default)]
    pub metadata: Option<PhotoMetadata>,
}

impl FileDetail {
    pub fn new(path: String, size: u64) -> Self {
        Self {
            file_type: classify(&path),
            extension: extension_of(&path),
            path,
            size,
            metadata: None,
        }
    }

    /// An entry whose structure could not be read is kept as "other".
    pub fn unreadable(path: Option<String>, index: usize) -> Self {
        let path = path.unwrap_or_else(|| format!("<unreadable entry {index}>"));
        Self {
            extension: extension_of(&path),
            path,
            size: 0,
            file_type: Category::Other,
            metadata: None,
        }
    }
}

/// Aggregate for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub path: String,
    pub parts_group: String,
    pub service_guess: String,
    pub source_type: SourceType,
    #[serde(flatten)]
    pub counts: ContentCounts,
}

/// Folds entries into an [`ArchiveSummary`] in walk order.
#[derive(Debug, Default)]
pub struct SummaryBuilder {
    counts: ContentCounts,
    service: ServiceGuesser,
}

impl SummaryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, detail: &FileDetail) {
        self.service.observe(&detail.path);
        self.counts
            .add_entry(detail.file_type, detail.size, detail.metadata.as_ref());
    }

    pub fn finish(
        mut self,
        path: String,
        parts_group: String,
        source_type: SourceType,
        compressed_size: u64,
        pairs: &[MediaPair],
    ) -> ArchiveSummary {
        self.counts.compressed_size = compressed_size;
        self.counts.add_pairs(pairs);
        ArchiveSummary {
            path,
            parts_group,
            service_guess: self.service.finish(),
            source_type,
            counts: self.counts,
        }
    }
}

/// Rollup of every source that shares a part group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group: String,
    pub parts: Vec<String>,
    pub service_guess: String,
    #[serde(flatten)]
    pub counts: ContentCounts,
}

/// Fold per-source summaries into one row per part group, sorted by group name.
pub fn summarize_groups(summaries: &[ArchiveSummary]) -> Vec<GroupSummary> {
    let mut by_group: BTreeMap<&str, Vec<&ArchiveSummary>> = BTreeMap::new();
    for summary in summaries {
        by_group
            .entry(summary.parts_group.as_str())
            .or_default()
            .push(summary);
    }

    by_group
        .into_iter()
        .map(|(group, mut members)| {
            members.sort_by(|a, b| a.path.cmp(&b.path));
            let mut counts = ContentCounts::default();
            for member in &members {
                counts.merge(&member.counts);
            }
            let service_guess = members
                .iter()
                .map(|m| m.service_guess.as_str())
                .find(|s| *s != UNKNOWN_SERVICE)
                .unwrap_or(UNKNOWN_SERVICE)
                .to_string();
            GroupSummary {
                group: group.to_string(),
                parts: members.iter().map(|m| m.path.clone()).collect(),
                service_guess,
                counts,
            }
        })
        .collect()
}
