use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use encoding_rs::SHIFT_JIS;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::cancel::CancellationToken;
use crate::error::ScanError;

/// Kind of source being scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Zip,
    Tgz,
    Directory,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Zip => "zip",
            SourceType::Tgz => "tgz",
            SourceType::Directory => "directory",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name-only source type check, used by the source finder.
pub fn archive_type_from_name(name: &str) -> Option<SourceType> {
    let lower = name.to_lowercase();
    if lower.ends_with(".zip") {
        Some(SourceType::Zip)
    } else if lower.ends_with(".tgz") || lower.ends_with(".tar.gz") || lower.ends_with(".gz") {
        Some(SourceType::Tgz)
    } else {
        None
    }
}

/// Decide the source type from the file system, the name, then magic bytes.
pub fn sniff_source_type(path: &Path) -> Result<SourceType, ScanError> {
    let meta = fs::metadata(path).map_err(|e| ScanError::from_io(path, e))?;
    if meta.is_dir() {
        return Ok(SourceType::Directory);
    }

    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if let Some(kind) = archive_type_from_name(name) {
        return Ok(kind);
    }

    let mut magic = [0u8; 4];
    let mut file = File::open(path).map_err(|e| ScanError::from_io(path, e))?;
    let n = file.read(&mut magic).map_err(|e| ScanError::from_io(path, e))?;
    match &magic[..n] {
        [b'P', b'K', 0x03, 0x04] | [b'P', b'K', 0x05, 0x06] => Ok(SourceType::Zip),
        [0x1f, 0x8b, ..] => Ok(SourceType::Tgz),
        _ => Err(ScanError::Unsupported {
            path: path.to_path_buf(),
        }),
    }
}

/// Decode ZIP entry name, trying UTF-8 first, then Shift_JIS
fn decode_zip_name(raw: &[u8]) -> String {
    let decoded = if let Ok(s) = std::str::from_utf8(raw) {
        s.to_string()
    } else {
        // Fall back to Shift_JIS (common for Japanese ZIP files)
        let (decoded, _, had_errors) = SHIFT_JIS.decode(raw);
        if !had_errors {
            decoded.into_owned()
        } else {
            String::from_utf8_lossy(raw).into_owned()
        }
    };
    decoded.nfc().collect()
}

enum ByteSource<'a> {
    Zip {
        archive: &'a mut ZipArchive<BufReader<File>>,
        index: usize,
    },
    Stream(&'a mut dyn Read),
    File(&'a Path),
}

/// One regular entry of a source: relative path, size, and a lazy byte accessor.
pub struct WalkEntry<'a> {
    pub path: String,
    pub size: u64,
    bytes: ByteSource<'a>,
}

impl WalkEntry<'_> {
    /// Read at most `limit` bytes from the start of the entry.
    ///
    /// For ZIP sources this is the only point where an entry is decompressed.
    pub fn read_prefix(&mut self, limit: u64) -> io::Result<Vec<u8>> {
        let capacity = self.size.min(limit) as usize;
        let mut buf = Vec::with_capacity(capacity);
        match &mut self.bytes {
            ByteSource::Zip { archive, index } => {
                let entry = archive
                    .by_index(*index)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                entry.take(limit).read_to_end(&mut buf)?;
            }
            ByteSource::Stream(reader) => {
                reader.take(limit).read_to_end(&mut buf)?;
            }
            ByteSource::File(path) => {
                File::open(path)?.take(limit).read_to_end(&mut buf)?;
            }
        }
        Ok(buf)
    }
}

/// What the walker hands to its visitor for each position in the source.
pub enum Walked<'a> {
    Entry(WalkEntry<'a>),
    /// An entry whose header could not be read. `path` is set when known.
    Unreadable { path: Option<String>, error: String },
}

/// Predicate for folder-walk paths that must not be counted (and are not descended into).
pub type SkipPath<'a> = &'a dyn Fn(&Path) -> bool;

/// How a source is walked.
#[derive(Clone, Copy, Default)]
pub struct WalkSettings<'a> {
    pub follow_symlinks: bool,
    pub skip: Option<SkipPath<'a>>,
    pub cancel: Option<&'a CancellationToken>,
}

/// Walk every regular entry of `source` in order, without extracting anything.
///
/// `visit` receives entries strictly one at a time, together with the number
/// of entries the source declares up front (0 when the format cannot know).
/// Failing to open the source is fatal, and so is a ZIP whose central
/// directory or local headers are broken. A tar header broken after the first
/// one, or a folder entry that cannot be stat'ed, is reported as
/// [`Walked::Unreadable`] and the walk goes on.
pub fn walk_source<F>(
    source: &Path,
    source_type: SourceType,
    settings: WalkSettings<'_>,
    mut visit: F,
) -> Result<(), ScanError>
where
    F: FnMut(Walked<'_>, u64),
{
    match source_type {
        SourceType::Zip => walk_zip(source, settings.cancel, &mut visit),
        SourceType::Tgz => walk_tgz(source, settings.cancel, &mut visit),
        SourceType::Directory => walk_directory(source, settings, &mut visit),
    }
}

fn check_cancel(cancel: Option<&CancellationToken>) -> Result<(), ScanError> {
    match cancel {
        Some(token) => token.check().map_err(|_| ScanError::Cancelled),
        None => Ok(()),
    }
}

fn walk_zip(
    source: &Path,
    cancel: Option<&CancellationToken>,
    visit: &mut dyn FnMut(Walked<'_>, u64),
) -> Result<(), ScanError> {
    let file = File::open(source).map_err(|e| ScanError::from_io(source, e))?;
    let corrupt = |e: zip::result::ZipError| ScanError::Corrupt {
        path: source.to_path_buf(),
        reason: e.to_string(),
    };
    // Opening validates every local header, so a bad one never gets this far.
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(corrupt)?;
    let total = archive.len();
    let declared = total as u64;

    for i in 0..total {
        check_cancel(cancel)?;

        // Central directory only; the payload stays compressed.
        let (path, size, is_dir) = archive
            .by_index_raw(i)
            .map(|entry| (decode_zip_name(entry.name_raw()), entry.size(), entry.is_dir()))
            .map_err(corrupt)?;
        if is_dir {
            continue;
        }
        visit(
            Walked::Entry(WalkEntry {
                path,
                size,
                bytes: ByteSource::Zip {
                    archive: &mut archive,
                    index: i,
                },
            }),
            declared,
        );
    }

    Ok(())
}

fn walk_tgz(
    source: &Path,
    cancel: Option<&CancellationToken>,
    visit: &mut dyn FnMut(Walked<'_>, u64),
) -> Result<(), ScanError> {
    let file = File::open(source).map_err(|e| ScanError::from_io(source, e))?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 2];
    reader.read_exact(&mut magic).map_err(|e| ScanError::Corrupt {
        path: source.to_path_buf(),
        reason: e.to_string(),
    })?;
    if magic != [0x1f, 0x8b] {
        return Err(ScanError::Corrupt {
            path: source.to_path_buf(),
            reason: "missing gzip header".to_string(),
        });
    }
    let reader = io::Cursor::new(magic).chain(reader);

    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let entries = archive.entries().map_err(|e| ScanError::Corrupt {
        path: source.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut seen_any = false;
    for item in entries {
        check_cancel(cancel)?;

        let mut entry = match item {
            Ok(entry) => entry,
            // Without a readable first header there is no archive to speak of.
            Err(e) if !seen_any => {
                return Err(ScanError::Corrupt {
                    path: source.to_path_buf(),
                    reason: e.to_string(),
                })
            }
            Err(e) => {
                visit(
                    Walked::Unreadable {
                        path: None,
                        error: e.to_string(),
                    },
                    0,
                );
                continue;
            }
        };
        seen_any = true;

        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = match entry.path() {
            Ok(p) => normalize_tar_path(&p),
            Err(e) => {
                visit(
                    Walked::Unreadable {
                        path: None,
                        error: e.to_string(),
                    },
                    0,
                );
                continue;
            }
        };
        let size = entry.size();
        visit(
            Walked::Entry(WalkEntry {
                path,
                size,
                bytes: ByteSource::Stream(&mut entry),
            }),
            0,
        );
    }

    Ok(())
}

fn normalize_tar_path(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    let trimmed = s.trim_start_matches("./");
    trimmed.nfc().collect()
}

fn walk_directory(
    root: &Path,
    settings: WalkSettings<'_>,
    visit: &mut dyn FnMut(Walked<'_>, u64),
) -> Result<(), ScanError> {
    // Surface an unreadable root as fatal rather than as one bad entry.
    fs::read_dir(root).map_err(|e| ScanError::from_io(root, e))?;

    let skip = settings.skip;
    let walker = WalkDir::new(root)
        .follow_links(settings.follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| e.depth() == 0 || !skip.is_some_and(|f| f(e.path())));

    for item in walker {
        check_cancel(settings.cancel)?;

        let entry = match item {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(|p| relative_path(root, p));
                visit(
                    Walked::Unreadable {
                        path,
                        error: e.to_string(),
                    },
                    0,
                );
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = relative_path(root, entry.path());
        match entry.metadata() {
            Ok(meta) => visit(
                Walked::Entry(WalkEntry {
                    path,
                    size: meta.len(),
                    bytes: ByteSource::File(entry.path()),
                }),
                0,
            ),
            Err(e) => visit(
                Walked::Unreadable {
                    path: Some(path),
                    error: e.to_string(),
                },
                0,
            ),
        }
    }

    Ok(())
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel: PathBuf = pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_path_buf());
    rel.to_string_lossy().replace('\\', "/")
}
