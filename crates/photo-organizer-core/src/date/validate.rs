use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Earliest plausible year for a consumer digital photo.
pub const EARLIEST_VALID_YEAR: i32 = 1990;

/// Canonical textual form handed to the organizer.
pub const CANONICAL_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Sentinel values written by buggy cameras and software to mean "no date".
pub const GARBAGE_DATE_PREFIXES: &[&str] = &[
    "0000:00:00",
    "    :  :  ",
    "0000-00-00",
    "1970:01:01 00:00:00",
    "1970-01-01 00:00:00",
    "1970-01-01T00:00:00",
];

/// Templates tried in order. Offset-bearing ones are parsed as `DateTime`.
const NAIVE_FORMATS: &[&str] = &[
    "%Y:%m:%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%z"];
const FRACTIONAL_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f"];
const FRACTIONAL_OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y:%m:%d %H:%M:%S%z"];
const DATE_ONLY_FORMATS: &[&str] = &["%Y-%m-%d", "%Y:%m:%d"];

static TRAILING_OFFSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[+-]\d{2}:\d{2}$").unwrap());

/// A creation date that passed validation.
///
/// The only way to obtain one is through [`validate`] or
/// [`CanonicalDate::from_naive`], so holding a value means the year is at
/// least 1990 and the date is not more than a day in the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalDate(NaiveDateTime);

impl CanonicalDate {
    /// Validate an already-parsed timestamp against the wall clock.
    pub fn from_naive(dt: NaiveDateTime) -> Option<Self> {
        Self::from_naive_at(dt, Local::now().naive_local())
    }

    pub fn from_naive_at(dt: NaiveDateTime, now: NaiveDateTime) -> Option<Self> {
        if dt.year() < EARLIEST_VALID_YEAR {
            log::debug!("Rejected pre-digital date: {} (year {})", dt, dt.year());
            return None;
        }
        if dt > now + Duration::days(1) {
            log::debug!("Rejected future date: {}", dt);
            return None;
        }
        Some(CanonicalDate(dt))
    }

    /// Same as [`validate`] for a non-optional string.
    pub fn parse(s: &str) -> Option<Self> {
        validate(Some(s))
    }

    pub fn naive(&self) -> NaiveDateTime {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }
}

impl fmt::Display for CanonicalDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(CANONICAL_FORMAT))
    }
}

impl serde::Serialize for CanonicalDate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Normalize and sanity-check a candidate date string.
///
/// Returns `None` for blank input, known placeholder values, anything that
/// does not parse, years before 1990 and dates more than one day ahead of
/// the local clock.
pub fn validate(raw: Option<&str>) -> Option<CanonicalDate> {
    validate_at(raw, Local::now().naive_local())
}

/// [`validate`] against an explicit "now".
pub fn validate_at(raw: Option<&str>, now: NaiveDateTime) -> Option<CanonicalDate> {
    let s = raw?.trim();
    if s.is_empty() {
        return None;
    }

    if GARBAGE_DATE_PREFIXES.iter().any(|p| s.starts_with(p)) {
        log::debug!("Rejected garbage date: {}", s);
        return None;
    }

    let Some(parsed) = parse_flexible(s) else {
        log::debug!("Could not parse date string: {}", s);
        return None;
    };

    CanonicalDate::from_naive_at(parsed, now)
}

fn parse_flexible(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();

    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.naive_local());
        }
    }
    for fmt in FRACTIONAL_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in FRACTIONAL_OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.naive_local());
        }
    }
    for fmt in DATE_ONLY_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    // "+05:30" / "Z" suffixes the templates above did not accept
    let cleaned = TRAILING_OFFSET_RE.replace(s, "");
    let cleaned = cleaned.trim_end_matches('Z');
    if cleaned != s {
        return parse_flexible(cleaned);
    }

    None
}
