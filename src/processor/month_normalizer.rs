use chrono::{Datelike, Days, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

static ISO_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})[-/.](\d{1,2})(?:[-/.]\d{1,2})?(?:[ T].*)?$").expect("valid regex"));

static MONTH_YEAR_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})[-/.](\d{4})$").expect("valid regex"));

static NAME_YEAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]{3,9})[\s\-_'’.,]*(\d{4}|\d{2})$").expect("valid regex"));

static YEAR_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})[\s\-_'’.,]*([A-Za-z]{3,9})$").expect("valid regex"));

/// A month value in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalMonth {
    /// Comparable key, `%b-%y` for recognized months, the trimmed input
    /// otherwise.
    pub label: String,
    /// Chronological order; unrecognized months sort last.
    pub order: i64,
}

pub const UNPARSED_MONTH_ORDER: i64 = i64::MAX;

/// Parse a month spelling into the first day of that month.
pub fn parse_month(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(serial) = text.parse::<f64>() {
        return from_excel_serial(serial);
    }

    if let Some(caps) = ISO_PATTERN.captures(text) {
        let year = caps[1].parse::<i32>().ok()?;
        let month = caps[2].parse::<u32>().ok()?;
        return NaiveDate::from_ymd_opt(year, month, 1);
    }

    if let Some(caps) = MONTH_YEAR_NUMERIC.captures(text) {
        let month = caps[1].parse::<u32>().ok()?;
        let year = caps[2].parse::<i32>().ok()?;
        return NaiveDate::from_ymd_opt(year, month, 1);
    }

    if let Some(caps) = NAME_YEAR_PATTERN.captures(text) {
        let month = month_from_name(&caps[1])?;
        let year = expand_year(&caps[2])?;
        return NaiveDate::from_ymd_opt(year, month, 1);
    }

    if let Some(caps) = YEAR_NAME_PATTERN.captures(text) {
        let year = caps[1].parse::<i32>().ok()?;
        let month = month_from_name(&caps[2])?;
        return NaiveDate::from_ymd_opt(year, month, 1);
    }

    None
}

/// Excel stores dates as days since 1899-12-30.
pub fn from_excel_serial(serial: f64) -> Option<NaiveDate> {
    if !(20000.0..80000.0).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = base.checked_add_days(Days::new(serial.trunc() as u64))?;
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
}

pub fn canonicalize(raw: &str) -> CanonicalMonth {
    match parse_month(raw) {
        Some(date) => CanonicalMonth {
            label: date.format("%b-%y").to_string(),
            order: i64::from(date.year()) * 12 + i64::from(date.month0()),
        },
        None => CanonicalMonth {
            label: raw.trim().to_string(),
            order: UNPARSED_MONTH_ORDER,
        },
    }
}

/// Canonical join key for a month cell.
pub fn month_key(raw: &str) -> String {
    canonicalize(raw).label
}

fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let prefix = lower.get(..3)?;
    MONTH_NAMES
        .iter()
        .position(|m| *m == prefix)
        .map(|idx| idx as u32 + 1)
}

fn expand_year(raw: &str) -> Option<i32> {
    let year = raw.parse::<i32>().ok()?;
    if raw.len() == 2 { Some(2000 + year) } else { Some(year) }
}
