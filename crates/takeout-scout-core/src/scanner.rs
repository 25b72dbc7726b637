use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::metadata::extract_photo_metadata;
use crate::pairs::{detect_media_pairs, MediaPair};
use crate::parts::group_for_source;
use crate::store::{normalize_source_path, SourceStamp};
use crate::summary::{ArchiveSummary, FileDetail, SummaryBuilder};
use crate::walker::{sniff_source_type, walk_source, SkipPath, WalkSettings, Walked};
use crate::{ScanControl, ScanOptions, ThrottledProgress};

/// Everything one scan of one source produced.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub summary: ArchiveSummary,
    /// Per-entry details, in walk order.
    pub files: Vec<FileDetail>,
    pub media_pairs: Vec<MediaPair>,
    pub stamp: Option<SourceStamp>,
}

impl ScanReport {
    pub fn source_path(&self) -> &str {
        &self.summary.path
    }
}

/// Walk one source and build its report. Nothing is persisted here.
///
/// Folder entries accepted by `skip` are left out of the report.
pub(crate) fn scan_source(
    source: &Path,
    options: &ScanOptions,
    skip: Option<SkipPath<'_>>,
    control: &ScanControl,
    progress: &ThrottledProgress<'_>,
) -> Result<ScanReport, ScanError> {
    let source = normalize_source_path(source);
    let source_type = match options.source_type {
        Some(declared) => declared,
        None => sniff_source_type(&source)?,
    };
    let source_str = source.to_string_lossy().into_owned();
    let parts_group = group_for_source(&source, source_type);
    let stamp = SourceStamp::of(&source).ok();

    let mut builder = SummaryBuilder::new();
    let mut files: Vec<FileDetail> = Vec::new();
    let mut unreadable = 0u64;

    let settings = WalkSettings {
        follow_symlinks: options.follow_symlinks,
        skip,
        cancel: control.cancel_token.as_ref(),
    };
    walk_source(&source, source_type, settings, |walked, total| {
        let detail = match walked {
            Walked::Entry(mut entry) => {
                let mut detail = FileDetail::new(entry.path.clone(), entry.size);
                if detail.file_type.wants_metadata() {
                    match entry.read_prefix(options.max_metadata_bytes) {
                        Ok(bytes) => {
                            detail.metadata = extract_photo_metadata(&bytes);
                            if detail.metadata.is_none() {
                                debug!(entry = %detail.path, "No decodable photo metadata");
                            }
                        }
                        Err(e) => {
                            unreadable += 1;
                            warn!(source = %source_str, entry = %detail.path, error = %e, "Failed to read photo bytes");
                        }
                    }
                }
                detail
            }
            Walked::Unreadable { path, error } => {
                let detail = FileDetail::unreadable(path, files.len());
                unreadable += 1;
                warn!(source = %source_str, entry = %detail.path, error = %error, "Unreadable entry counted as other");
                detail
            }
        };
        progress.report("scan", files.len() as u64, total, &detail.path);
        builder.add(&detail);
        files.push(detail);
    })?;

    let listing: Vec<(String, u64)> = files.iter().map(|f| (f.path.clone(), f.size)).collect();
    let media_pairs = detect_media_pairs(&listing);

    let compressed_size = match source_type {
        crate::SourceType::Directory => files.iter().map(|f| f.size).sum(),
        crate::SourceType::Zip | crate::SourceType::Tgz => fs::metadata(&source)
            .map(|m| m.len())
            .map_err(|e| ScanError::from_io(&source, e))?,
    };

    let mut summary = builder.finish(
        source_str.clone(),
        parts_group,
        source_type,
        compressed_size,
        &media_pairs,
    );
    summary.counts.unreadable_entries = unreadable;
    progress.finish("scan", files.len() as u64, &source_str);
    info!(
        source = %source_str,
        source_type = %source_type,
        files = summary.counts.file_count,
        photos = summary.counts.photos,
        unreadable,
        service = %summary.service_guess,
        "Scanned source"
    );

    Ok(ScanReport {
        summary,
        files,
        media_pairs,
        stamp,
    })
}
