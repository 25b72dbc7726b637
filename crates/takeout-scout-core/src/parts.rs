use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::walker::SourceType;

/// `<prefix>-NNN.zip`, `<prefix>-NNN.tgz`, `<prefix>-NNN.tar.gz`
static NUMBERED_PART_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<prefix>.+?)-\d{3,}(?:\.zip|\.tgz|\.tar\.gz)$").unwrap()
});

/// Google's own `Takeout-20240101T000000Z-<tag>-NNN` stem
static TAKEOUT_STEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(Takeout-\d{8}T\d{6}Z-\w+?)-\d{3,}$").unwrap()
});

const ARCHIVE_SUFFIXES: &[&str] = &[".tar.gz", ".tgz", ".zip", ".gz"];

/// One grouping rule: returns the group name when it recognizes the file name.
struct PartRule {
    name: &'static str,
    apply: fn(&str) -> Option<String>,
}

static PART_RULES: &[PartRule] = &[
    PartRule {
        name: "numbered-part",
        apply: numbered_part,
    },
    PartRule {
        name: "takeout-stem",
        apply: takeout_stem,
    },
];

fn numbered_part(file_name: &str) -> Option<String> {
    NUMBERED_PART_RE
        .captures(file_name)
        .map(|c| c["prefix"].to_string())
}

fn takeout_stem(file_name: &str) -> Option<String> {
    TAKEOUT_STEM_RE
        .captures(archive_stem(file_name))
        .map(|c| c[1].to_string())
}

/// File name with one archive extension removed, case-insensitively.
pub fn archive_stem(file_name: &str) -> &str {
    let bytes = file_name.as_bytes();
    for suffix in ARCHIVE_SUFFIXES {
        let cut = bytes.len().saturating_sub(suffix.len());
        if cut > 0 && bytes[cut..].eq_ignore_ascii_case(suffix.as_bytes()) {
            // The tail is ASCII, so `cut` is a char boundary.
            return &file_name[..cut];
        }
    }
    file_name
}

/// Group identifier for one archive file name.
///
/// Files that differ only in their part number always share a group.
/// Unrelated archives that happen to share a base name are grouped too.
pub fn part_group_name(file_name: &str) -> String {
    for rule in PART_RULES {
        if let Some(group) = (rule.apply)(file_name) {
            tracing::trace!(rule = rule.name, file_name, group = %group, "part rule matched");
            return group;
        }
    }
    archive_stem(file_name).to_string()
}

/// Group identifier for a source path. Directories are grouped by their own name.
pub fn group_for_source(path: &Path, source_type: SourceType) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    match source_type {
        SourceType::Directory => name,
        SourceType::Zip | SourceType::Tgz => part_group_name(&name),
    }
}

/// Resolve every name of a batch to its group. Members are kept sorted.
pub fn resolve_part_groups<'a, I>(file_names: I) -> BTreeMap<String, Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in file_names {
        groups
            .entry(part_group_name(name))
            .or_default()
            .push(name.to_string());
    }
    for members in groups.values_mut() {
        members.sort();
        members.dedup();
    }
    groups
}
