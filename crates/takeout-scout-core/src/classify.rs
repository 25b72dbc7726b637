use std::path::Path;

use serde::{Deserialize, Serialize};

const PHOTO_EXTENSIONS: &[&str] = &[
    // Common formats
    "jpg", "jpeg", "jfif", "png", "heic", "heif", "webp", "gif", "bmp", "tif", "tiff", "avif",
    "jxl",
    // RAW formats
    "raw", "dng", "arw", "cr2", "cr3", "nef", "nrw", "orf", "rw2", "raf", "srf", "sr2", "pef",
    "srw",
    // Other
    "psd", "svg",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "m4v", "avi", "mts", "m2ts", "wmv", "3gp", "mkv", "webm", "mpg", "mpeg", "flv",
    "ogv", "vob", "ts", "mxf",
];

const JSON_EXTENSIONS: &[&str] = &["json"];

/// Content category of one entry, decided from its file name only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Photo,
    Video,
    #[serde(rename = "json")]
    JsonSidecar,
    Other,
}

impl Category {
    /// Photos are the only entries whose bytes are ever read.
    pub fn wants_metadata(self) -> bool {
        self == Category::Photo
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Photo => "photo",
            Category::Video => "video",
            Category::JsonSidecar => "json",
            Category::Other => "other",
        }
    }
}

/// Lowercased extension including the dot (".jpg"), or "" when there is none.
pub fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Classify an entry by extension, case-insensitively.
pub fn classify(path: &str) -> Category {
    let ext = extension_of(path);
    let Some(ext) = ext.strip_prefix('.') else {
        return Category::Other;
    };
    if PHOTO_EXTENSIONS.contains(&ext) {
        Category::Photo
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        Category::Video
    } else if JSON_EXTENSIONS.contains(&ext) {
        Category::JsonSidecar
    } else {
        Category::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(classify("Takeout/Google Photos/IMG_0001.JPG"), Category::Photo);
        assert_eq!(classify("a/b/scan.tiff"), Category::Photo);
        assert_eq!(classify("DSC_1.NEF"), Category::Photo);
        assert_eq!(classify("clip.MOV"), Category::Video);
        assert_eq!(classify("IMG_0001.jpg.json"), Category::JsonSidecar);
        assert_eq!(classify("archive_browser.html"), Category::Other);
        assert_eq!(classify("README"), Category::Other);
        assert_eq!(classify(".hidden"), Category::Other);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("x/IMG.HEIC"), ".heic");
        assert_eq!(extension_of("x/photo.jpg.json"), ".json");
        assert_eq!(extension_of("noext"), "");
    }

    #[test]
    fn test_only_photos_want_metadata() {
        assert!(Category::Photo.wants_metadata());
        assert!(!Category::Video.wants_metadata());
        assert!(!Category::JsonSidecar.wants_metadata());
    }

    #[test]
    fn test_display_name_matches_record_format() {
        for category in [Category::Photo, Category::Video, Category::JsonSidecar, Category::Other] {
            let wire = serde_json::to_string(&category).unwrap();
            assert_eq!(wire, format!("\"{}\"", category.as_str()));
        }
    }
}
