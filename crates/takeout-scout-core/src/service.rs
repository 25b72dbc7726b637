use regex::Regex;
use std::sync::LazyLock;

/// Label used when no rule recognizes any entry path.
pub const UNKNOWN_SERVICE: &str = "Unknown";

/// Localized prefixes: "<prefix>YYYY"
const YEAR_FOLDER_PREFIXES: &[&str] = &[
    "Photos from ",      // EN
    "Fotos von ",        // DE
    "Fotos aus ",        // DE (alternate)
    "Photos de ",        // FR
    "Fotos de ",         // ES, PT, CA
    "Foto's uit ",       // NL
    "Foto dal ",         // IT
    "Foto del ",         // IT (alternate)
    "Zdjęcia z ",        // PL
    "Фото за ",          // RU
    "Фотографии за ",    // RU (alternate)
    "Fotky z ",          // CS
    "Fotografii din ",   // RO
    "Foton från ",       // SV
    "Bilder fra ",       // NO
    "Billeder fra ",     // DA
    "Valokuvat ",        // FI
    "Fényképek - ",      // HU
    "Fotoğraflar ",      // TR
];

/// Localized suffixes: "YYYY<suffix>"
const YEAR_FOLDER_SUFFIXES: &[&str] = &[
    " 年の写真",   // JA
    "年のフォト",   // JA (alternate)
    "년의 사진",    // KO
    "年的照片",     // ZH-CN
    "年的相片",     // ZH-TW
];

/// Substrings that mark a localized Google Photos folder name
const PHOTOS_NAME_MARKERS: &[&str] = &["hoto", "Foto", "ото", "フォト", "照片", "相片", "사진"];

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(20|19|18)\d{2}$").unwrap());

/// Check if a folder name matches a Google Photos year folder in any locale
pub fn is_year_folder(name: &str) -> bool {
    let by_prefix = YEAR_FOLDER_PREFIXES
        .iter()
        .filter_map(|prefix| name.strip_prefix(prefix))
        .any(|rest| YEAR_RE.is_match(rest));
    by_prefix
        || YEAR_FOLDER_SUFFIXES
            .iter()
            .filter_map(|suffix| name.strip_suffix(suffix))
            .any(|rest| YEAR_RE.is_match(rest))
}

/// Localized "Google Photos" top folder: "Google Photos", "Google Фото", "Google フォト", ...
pub fn is_google_photos_folder(name: &str) -> bool {
    name.starts_with("Google") && PHOTOS_NAME_MARKERS.iter().any(|m| name.contains(m))
}

fn google_photos(path: &str) -> bool {
    path.split('/')
        .any(|c| is_google_photos_folder(c) || is_year_folder(c))
}

macro_rules! path_pattern {
    ($fn_name:ident, $re:literal) => {
        fn $fn_name(path: &str) -> bool {
            static RE: LazyLock<Regex> = LazyLock::new(|| Regex::new($re).unwrap());
            RE.is_match(path)
        }
    };
}

path_pattern!(google_drive, r"(?i)Google Drive");
path_pattern!(google_maps, r"(?i)Maps|Location|Contributions");
path_pattern!(hangouts_chat, r"(?i)Hangouts|Chat");
path_pattern!(blogger_album_archive, r"(?i)Blogger|Album Archive|Picasa");
path_pattern!(contacts, r"(?i)Contacts");
path_pattern!(calendar, r"(?i)Calendar");
path_pattern!(mail, r"(?i)Mail");
path_pattern!(youtube, r"(?i)YouTube");
path_pattern!(keep, r"(?i)Keep");

/// One predicate -> label rule. Rules are independent and tried in list order.
pub struct ServiceRule {
    pub label: &'static str,
    pub matches: fn(&str) -> bool,
}

pub static SERVICE_RULES: &[ServiceRule] = &[
    ServiceRule { label: "Google Photos", matches: google_photos },
    ServiceRule { label: "Google Drive", matches: google_drive },
    ServiceRule { label: "Google Maps", matches: google_maps },
    ServiceRule { label: "Hangouts/Chat", matches: hangouts_chat },
    ServiceRule { label: "Blogger/Album Archive", matches: blogger_album_archive },
    ServiceRule { label: "Contacts", matches: contacts },
    ServiceRule { label: "Calendar", matches: calendar },
    ServiceRule { label: "Mail", matches: mail },
    ServiceRule { label: "YouTube", matches: youtube },
    ServiceRule { label: "Keep", matches: keep },
];

/// Incremental service guess over a stream of entry paths.
///
/// The highest-priority rule that matches *any* observed path wins, regardless
/// of the order in which paths arrive.
#[derive(Debug, Default)]
pub struct ServiceGuesser {
    best: Option<usize>,
}

impl ServiceGuesser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, path: &str) {
        let limit = self.best.unwrap_or(SERVICE_RULES.len());
        if let Some(idx) = SERVICE_RULES[..limit]
            .iter()
            .position(|rule| (rule.matches)(path))
        {
            self.best = Some(idx);
        }
    }

    pub fn finish(&self) -> String {
        self.best
            .map(|idx| SERVICE_RULES[idx].label)
            .unwrap_or(UNKNOWN_SERVICE)
            .to_string()
    }
}

/// Guess the originating Google service from a set of entry paths.
pub fn guess_service<'a, I>(paths: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut guesser = ServiceGuesser::new();
    for path in paths {
        guesser.observe(path);
    }
    guesser.finish()
}
