use scraper::{Html, Selector};
use tracing::debug;

use crate::models::RawEarningsRow;

use super::ScrapeError;

/// Class tokens of the earnings calendar table. Yahoo's obfuscated class
/// names churn on redesigns; this is the marker observed on the current
/// markup and there is deliberately no fallback table search.
const TABLE_SELECTOR: &str = "table.yf-7uw1qi.bd";

fn selector(s: &'static str) -> Result<Selector, ScrapeError> {
    Selector::parse(s).map_err(|_| ScrapeError::Selector(s))
}

// ── Earnings calendar page ────────────────────────────────────────────────────

/// Extract raw earnings rows from a calendar page.
/// The table is located by its structural class marker; a page without it is
/// a fatal `TableNotFound`, not an empty result.
pub fn parse_earnings_rows(html: &str) -> Result<Vec<RawEarningsRow>, ScrapeError> {
    let doc = Html::parse_document(html);

    let table_sel = selector(TABLE_SELECTOR)?;
    let th_sel = selector("thead th")?;
    let tr_sel = selector("tbody tr")?;
    let td_sel = selector("td")?;

    let Some(table) = doc.select(&table_sel).next() else {
        return Err(ScrapeError::TableNotFound);
    };

    let headers: Vec<String> = table
        .select(&th_sel)
        .map(|th| th.text().collect::<String>().trim().to_lowercase())
        .collect();

    // Column positions from headers, with the portal's current layout as
    // fallback: Symbol | Company | Earnings Date | EPS Estimate | Reported EPS | Surprise(%)
    let position = |needle: &str, default: usize| {
        headers
            .iter()
            .position(|h| h.contains(needle))
            .unwrap_or(default)
    };
    let symbol_idx = position("symbol", 0);
    let company_idx = position("company", 1);
    let date_idx = position("earnings date", 2);
    let estimate_idx = position("eps estimate", 3);
    let reported_idx = position("reported eps", 4);
    let surprise_idx = position("surprise", 5);

    let mut rows = Vec::new();
    for tr in table.select(&tr_sel) {
        let cells: Vec<String> = tr
            .select(&td_sel)
            .map(|td| td.text().collect::<String>().trim().to_string())
            .collect();

        if cells.is_empty() || cells.iter().all(|c| c.is_empty()) {
            continue;
        }

        rows.push(RawEarningsRow {
            symbol: cells.get(symbol_idx).cloned(),
            company: cells.get(company_idx).cloned(),
            earnings_date: cells.get(date_idx).cloned(),
            eps_estimate: cells.get(estimate_idx).cloned(),
            reported_eps: cells.get(reported_idx).cloned(),
            surprise_pct: cells.get(surprise_idx).cloned(),
        });
    }

    debug!("Parsed {} raw rows from earnings table", rows.len());
    Ok(rows)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
