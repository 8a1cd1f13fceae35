use std::collections::BTreeMap;

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::scraper::ScrapeError;

// ── Page response ─────────────────────────────────────────────────────────────

/// Response model shared by the consent gate and the table extractor.
/// `url` is the *final* URL after redirects — consent detection keys off it.
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub url: String,
    pub status: StatusCode,
    pub text: String,
}

impl PageResponse {
    /// Non-2xx statuses are fatal for the earnings fetch — no retry.
    pub fn error_for_status(&self) -> Result<(), ScrapeError> {
        if self.status.is_success() {
            Ok(())
        } else {
            Err(ScrapeError::Http {
                url: self.url.clone(),
                status: self.status,
            })
        }
    }
}

// ── Earnings rows ─────────────────────────────────────────────────────────────

/// Normalized earnings report. EPS columns stay strings at this layer:
/// Yahoo renders "-" for pending reports and coercion is a caller concern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EarningsRow {
    pub date: NaiveDate,
    pub eps_estimate: String,
    pub reported_eps: String,
    pub surprise_pct: String,
}

/// Raw table row as scraped: every cell optional, nothing parsed yet.
/// Columns match the portal's earnings calendar table.
#[derive(Debug, Clone, Default)]
pub struct RawEarningsRow {
    pub symbol: Option<String>,
    pub company: Option<String>,
    pub earnings_date: Option<String>,
    pub eps_estimate: Option<String>,
    pub reported_eps: Option<String>,
    pub surprise_pct: Option<String>,
}

impl RawEarningsRow {
    /// A row is usable only when Symbol, Company and Earnings Date are all
    /// present. Presence is checked on the raw strings, before any parsing.
    pub fn has_required_fields(&self) -> bool {
        [&self.symbol, &self.company, &self.earnings_date]
            .iter()
            .all(|f| f.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

// ── Earnings table ────────────────────────────────────────────────────────────

/// Ordered sequence of earnings rows, indexable by calendar date.
/// Multiple rows may share a date; the index view keeps the last one written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EarningsTable {
    pub rows: Vec<EarningsRow>,
}

impl EarningsTable {
    pub fn new(rows: Vec<EarningsRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EarningsRow> {
        self.rows.iter()
    }

    /// Date-keyed view. Insertion order follows row order, so a later row
    /// overwrites an earlier one sharing the same date.
    pub fn index_by_date(&self) -> BTreeMap<NaiveDate, &EarningsRow> {
        let mut index = BTreeMap::new();
        for row in &self.rows {
            index.insert(row.date, row);
        }
        index
    }

    pub fn get(&self, date: NaiveDate) -> Option<&EarningsRow> {
        self.index_by_date().get(&date).copied()
    }
}

// ── Consent form ──────────────────────────────────────────────────────────────

/// Submittable field of the consent form. `kind` is the input's `type`
/// attribute, lowercased ("text" when absent).
#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    pub kind: String,
    pub value: String,
    pub checked: bool,
}

/// Parsed consent form: resolved action URL plus named fields in document
/// order. Nameless inputs are dropped during parsing.
#[derive(Debug, Clone)]
pub struct ConsentForm {
    pub action: Url,
    pub fields: Vec<FormField>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: &str, est: &str) -> EarningsRow {
        EarningsRow {
            date: date.parse().unwrap(),
            eps_estimate: est.to_string(),
            reported_eps: "-".to_string(),
            surprise_pct: "-".to_string(),
        }
    }

    #[test]
    fn test_index_by_date_keeps_last_row() {
        let table = EarningsTable::new(vec![
            row("2025-02-06", "2.09"),
            row("2025-02-06", "2.15"),
            row("2024-10-31", "1.92"),
        ]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.index_by_date().len(), 2);
        assert_eq!(
            table.get("2025-02-06".parse().unwrap()).unwrap().eps_estimate,
            "2.15"
        );
    }

    #[test]
    fn test_required_fields_presence() {
        let mut raw = RawEarningsRow {
            symbol: Some("AAPL".into()),
            company: Some("Apple Inc.".into()),
            earnings_date: Some("Oct 30, 2025, 4:00 PM EDT".into()),
            ..Default::default()
        };
        assert!(raw.has_required_fields());

        raw.symbol = None;
        assert!(!raw.has_required_fields());

        raw.symbol = Some("  ".into());
        assert!(!raw.has_required_fields());
    }
}
