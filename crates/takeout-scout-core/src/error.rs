use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort the scan of one source. Nothing is persisted for it.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Source not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Permission denied accessing: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Unsupported source type: {path}")]
    Unsupported { path: PathBuf },

    #[error("Corrupt archive {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Scan was cancelled")]
    Cancelled,
}

impl ScanError {
    /// Map an open/stat failure on `path` to the matching variant.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => ScanError::NotFound { path },
            std::io::ErrorKind::PermissionDenied => ScanError::PermissionDenied { path },
            _ => ScanError::Io { path, source },
        }
    }
}

/// Failures reading or writing the discovery store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed store file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Record for {key} declares source path {found}")]
    Mismatch { key: String, found: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        StoreError::Json {
            path: path.into(),
            source,
        }
    }
}

/// Top-level error returned by the front-end calls.
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ScoutError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScoutError::Scan(ScanError::Cancelled))
    }
}

pub type Result<T, E = ScoutError> = std::result::Result<T, E>;
