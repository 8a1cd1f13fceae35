use chrono::{LocalResult, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use tracing::warn;

use crate::models::{EarningsRow, EarningsTable, RawEarningsRow};

use super::ScrapeError;

// ── Parsers ───────────────────────────────────────────────────────────────────

pub fn normalise_symbol(s: &str) -> String {
    s.trim().to_uppercase()
}

/// Strip a single leading "+" from a signed percentage string.
/// "+16.06" → "16.06" | "-19.36" → "-19.36" | "-" → "-"
pub fn strip_plus(s: &str) -> String {
    s.strip_prefix('+').unwrap_or(s).to_string()
}

/// Closed timezone-abbreviation table. The format cascade below cannot
/// resolve these abbreviations unaided; extend only when a new one is
/// observed on the portal.
fn tz_alias(abbr: &str) -> Option<Tz> {
    match abbr {
        "EDT" | "EST" => Some(chrono_tz::America::New_York),
        _ => None,
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%b %d, %Y, %I:%M %p",
    "%b %d, %Y at %I:%M %p",
    "%b %d, %Y %I:%M %p",
];

const DATE_FORMATS: &[&str] = &["%b %d, %Y", "%Y-%m-%d"];

/// Split a trailing timezone abbreviation off a date string.
/// "AM"/"PM" are never zone tokens.
fn split_zone_suffix(s: &str) -> (&str, Option<&str>) {
    match s.rsplit_once(char::is_whitespace) {
        Some((stem, last))
            if (2..=5).contains(&last.len())
                && last != "AM"
                && last != "PM"
                && last.chars().all(|c| c.is_ascii_uppercase()) =>
        {
            (stem.trim_end(), Some(last))
        }
        _ => (s, None),
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
}

/// Parse the portal's earnings-date strings: "Oct 30, 2025, 4:00 PM EDT",
/// with or without time and zone. The result is truncated to a calendar
/// date. A trailing abbreviation outside the alias table fails the parse.
pub fn parse_earnings_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (stem, zone) = split_zone_suffix(s);

    if let Some(abbr) = zone {
        let tz = tz_alias(abbr)?;
        let dt = parse_datetime(stem)?;
        return Some(match tz.from_local_datetime(&dt) {
            LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t.date_naive(),
            // Wall time skipped by a DST jump; the calendar date is unaffected
            LocalResult::None => dt.date(),
        });
    }

    if let Some(dt) = parse_datetime(stem) {
        return Some(dt.date());
    }

    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(stem, f).ok())
}

// ── Raw rows → EarningsTable ──────────────────────────────────────────────────

/// Normalize scraped rows into an `EarningsTable`.
///
/// Rows missing Symbol, Company or Earnings Date are dropped before any
/// other transform. A retained row whose date cannot be parsed fails the
/// whole clean.
pub fn clean_earnings_rows(raw_rows: Vec<RawEarningsRow>) -> Result<EarningsTable, ScrapeError> {
    let mut rows = Vec::new();
    let mut dropped = 0usize;

    for raw in raw_rows {
        if !raw.has_required_fields() {
            dropped += 1;
            continue;
        }

        let date_str = raw.earnings_date.unwrap_or_default();
        let date = parse_earnings_date(&date_str)
            .ok_or_else(|| ScrapeError::DateParse(date_str.clone()))?;

        rows.push(EarningsRow {
            date,
            eps_estimate: raw.eps_estimate.unwrap_or_default(),
            reported_eps: raw.reported_eps.unwrap_or_default(),
            surprise_pct: strip_plus(&raw.surprise_pct.unwrap_or_default()),
        });
    }

    if dropped > 0 {
        warn!("Dropped {} rows with missing required fields", dropped);
    }

    Ok(EarningsTable::new(rows))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
