use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// Photo halves of a pair, in preference order.
const PAIR_PHOTO_EXTS: &[&str] = &[".heic", ".heif", ".jpg", ".jpeg"];
/// Video halves of an Apple Live Photo, in preference order.
const LIVE_VIDEO_EXTS: &[&str] = &[".mov", ".mp4"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairType {
    LivePhoto,
    PhotoJson,
}

/// Two entries that together form one media item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPair {
    pub pair_type: PairType,
    pub photo_path: String,
    pub companion_path: String,
    pub photo_size: u64,
    pub companion_size: u64,
    pub base_name: String,
}

impl MediaPair {
    pub fn total_size(&self) -> u64 {
        self.photo_size + self.companion_size
    }
}

struct Member<'a> {
    path: &'a str,
    size: u64,
    ext: String,
}

/// Split "dir/IMG_1.jpg.json" into ("dir", "IMG_1"); sidecars lose their ".json" first.
fn pairing_key(path: &str) -> (&str, &str) {
    let (parent, name) = path.rsplit_once('/').unwrap_or(("", path));
    let name = if name.len() > 5 && name.as_bytes()[name.len() - 5..].eq_ignore_ascii_case(b".json") {
        &name[..name.len() - 5]
    } else {
        name
    };
    let stem = match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..dot],
    };
    (parent, stem)
}

fn stem_of(path: &str) -> String {
    let name = path.rsplit_once('/').map_or(path, |(_, n)| n);
    match name.rfind('.') {
        Some(0) | None => name.to_string(),
        Some(dot) => name[..dot].to_string(),
    }
}

/// Find Live Photo pairs and photo + JSON sidecar pairs by file name alone.
///
/// Entries are grouped by folder and base name. A photo already claimed by a
/// Live Photo pair is not paired again with its sidecar. The output order is
/// stable for a given input.
pub fn detect_media_pairs(files: &[(String, u64)]) -> Vec<MediaPair> {
    let mut by_base: BTreeMap<(&str, &str), Vec<Member<'_>>> = BTreeMap::new();
    for (path, size) in files {
        by_base.entry(pairing_key(path)).or_default().push(Member {
            path,
            size: *size,
            ext: crate::classify::extension_of(path),
        });
    }

    let mut pairs = Vec::new();
    for members in by_base.values().filter(|m| m.len() >= 2) {
        // Later duplicates of one extension win.
        let by_ext: BTreeMap<&str, &Member<'_>> =
            members.iter().map(|m| (m.ext.as_str(), m)).collect();
        let mut claimed: HashSet<&str> = HashSet::new();

        let photo = PAIR_PHOTO_EXTS.iter().find_map(|e| by_ext.get(e));
        let video = LIVE_VIDEO_EXTS.iter().find_map(|e| by_ext.get(e));
        if let (Some(photo), Some(video)) = (photo, video) {
            pairs.push(MediaPair {
                pair_type: PairType::LivePhoto,
                photo_path: photo.path.to_string(),
                companion_path: video.path.to_string(),
                photo_size: photo.size,
                companion_size: video.size,
                base_name: stem_of(photo.path),
            });
            claimed.insert(photo.path);
        }

        for ext in PAIR_PHOTO_EXTS {
            let Some(photo) = by_ext.get(ext) else {
                continue;
            };
            if claimed.contains(photo.path) {
                continue;
            }
            let sidecar_suffix = format!("{ext}.json");
            let sidecar = members
                .iter()
                .find(|m| m.path.to_lowercase().ends_with(&sidecar_suffix));
            if let Some(sidecar) = sidecar {
                pairs.push(MediaPair {
                    pair_type: PairType::PhotoJson,
                    photo_path: photo.path.to_string(),
                    companion_path: sidecar.path.to_string(),
                    photo_size: photo.size,
                    companion_size: sidecar.size,
                    base_name: stem_of(photo.path),
                });
                claimed.insert(photo.path);
            }
        }
    }
    pairs
}
