use chrono::NaiveDate;
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::LazyLock;

use super::validate::{validate, CanonicalDate};
use crate::error::ExtractError;
use crate::formats::DateExtractor;

/// Which family of filename conventions a pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    /// `YYYYMMDD_HHMMSS` and friends (Android, Pixel, Samsung, WhatsApp)
    CompactDateTime,
    /// `YYYY-MM-DD at HH.MM.SS` (macOS screenshots, Signal)
    SeparatedDateTime,
    /// Date only, time defaults to noon
    DateOnly,
}

struct DatePattern {
    regex: &'static LazyLock<Regex>,
    tier: Tier,
}

static RE_COMPACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?:^|\D)(?P<y>(?:19|20)\d{2})(?P<m>\d{2})(?P<d>\d{2})",
        r"[_-](?P<H>\d{2})(?P<M>\d{2})(?P<S>\d{2})",
    ))
    .unwrap()
});
static RE_SEPARATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)(?:^|\D)(?P<y>(?:19|20)\d{2})[-_](?P<m>\d{2})[-_](?P<d>\d{2})",
        r"(?:\s+at\s+|\s+|_|-|T)",
        r"(?P<H>\d{1,2})[.\-:_](?P<M>\d{2})[.\-:_](?P<S>\d{2})(?:\s*(?P<ampm>[AP]M))?",
    ))
    .unwrap()
});
static RE_SEPARATED_COMPACT_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?:^|\D)(?P<y>(?:19|20)\d{2})[-_](?P<m>\d{2})[-_](?P<d>\d{2})",
        r"[-_](?P<H>\d{2})(?P<M>\d{2})(?P<S>\d{2})(?:\D|$)",
    ))
    .unwrap()
});
static RE_DATE_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\D)(?P<y>(?:19|20)\d{2})[-_.]?(?P<m>\d{2})[-_.]?(?P<d>\d{2})(?:\D|$)")
        .unwrap()
});

static PATTERNS: &[DatePattern] = &[
    DatePattern { regex: &RE_COMPACT, tier: Tier::CompactDateTime },
    DatePattern { regex: &RE_SEPARATED, tier: Tier::SeparatedDateTime },
    DatePattern { regex: &RE_SEPARATED_COMPACT_TIME, tier: Tier::SeparatedDateTime },
    DatePattern { regex: &RE_DATE_ONLY, tier: Tier::DateOnly },
];

/// Guess a capture date from camera, phone and app naming conventions.
///
/// Only the file stem is looked at, so this works for empty or unreadable
/// files too. The result still goes through the validator.
pub fn guess_date_from_filename(filename: &str) -> Option<CanonicalDate> {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    for pat in PATTERNS {
        for caps in pat.regex.captures_iter(stem) {
            let Some(candidate) = build_candidate(&caps, pat.tier) else {
                continue;
            };
            if let Some(date) = validate(Some(&candidate)) {
                return Some(date);
            }
        }
    }

    None
}

/// The filename heuristics as a resolver stage.
#[derive(Debug, Default)]
pub struct FilenameGuesser;

impl DateExtractor for FilenameGuesser {
    fn name(&self) -> &'static str {
        "filename"
    }

    fn read(&self, path: &Path) -> Result<Option<CanonicalDate>, ExtractError> {
        Ok(path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(guess_date_from_filename))
    }
}

fn build_candidate(caps: &Captures, tier: Tier) -> Option<String> {
    let num = |name: &str| -> Option<u32> { caps.name(name)?.as_str().parse().ok() };

    let year = num("y")? as i32;
    let month = num("m")?;
    let day = num("d")?;
    let (mut hour, minute, second) = match tier {
        Tier::DateOnly => (12, 0, 0),
        _ => (num("H")?, num("M")?, num("S")?),
    };

    if let Some(ampm) = caps.name("ampm") {
        if hour == 0 || hour > 12 {
            return None;
        }
        let pm = ampm.as_str().eq_ignore_ascii_case("pm");
        hour = match (pm, hour) {
            (false, 12) => 0,
            (true, 12) => 12,
            (true, h) => h + 12,
            (false, h) => h,
        };
    }

    let dt = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    Some(dt.format(super::validate::CANONICAL_FORMAT).to_string())
}
