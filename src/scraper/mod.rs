pub mod cleaner;
pub mod http_client;
pub mod parsers;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use crate::config::ScraperConfig;
use crate::models::{EarningsTable, PageResponse};

use self::cleaner::normalise_symbol;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid limit {0}: must be between 1 and 100")]
    InvalidLimit(u32),

    #[error("request for {url} failed with status {status}")]
    Http { url: String, status: StatusCode },

    #[error("earnings table not found on page")]
    TableNotFound,

    #[error("unparseable earnings date {0:?}")]
    DateParse(String),

    #[error("invalid selector {0:?}")]
    Selector(&'static str),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

// ── Cached-fetch collaborator ─────────────────────────────────────────────────

/// GET-with-cache contract the extractor delegates page fetches to.
/// Caching policy (what to store, for how long) is the implementor's concern.
#[async_trait]
pub trait CachedFetch: Send + Sync {
    async fn cache_get(&self, url: &str) -> Result<PageResponse, ScrapeError>;
}

// ── Page-size tiers ───────────────────────────────────────────────────────────

/// Map a requested row limit onto one of the portal's supported page sizes.
/// Anything outside 1..=100 is rejected before any network call.
pub fn resolve_page_size(limit: u32) -> Result<u32, ScrapeError> {
    match limit {
        1..=25 => Ok(25),
        26..=50 => Ok(50),
        51..=100 => Ok(100),
        _ => Err(ScrapeError::InvalidLimit(limit)),
    }
}

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable earnings-page source abstraction.
#[async_trait]
pub trait EarningsSource: Send + Sync {
    async fn fetch_earnings_page(
        &self,
        ticker: &str,
        offset: u32,
        limit: u32,
    ) -> Result<PageResponse, ScrapeError>;
}

// ── Yahoo earnings scraper ────────────────────────────────────────────────────

pub struct YahooEarningsScraper {
    fetcher: Arc<dyn CachedFetch>,
    base_url: String,
}

impl YahooEarningsScraper {
    pub fn new(config: &ScraperConfig, fetcher: Arc<dyn CachedFetch>) -> Self {
        Self {
            fetcher,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// URL for one page of a ticker's earnings calendar.
    /// e.g. AAPL, offset 0, size 100 → /calendar/earnings?symbol=AAPL&offset=0&size=100
    fn earnings_url(&self, ticker: &str, offset: u32, size: u32) -> String {
        format!(
            "{}?symbol={}&offset={}&size={}",
            self.base_url,
            normalise_symbol(ticker),
            offset,
            size
        )
    }
}

#[async_trait]
impl EarningsSource for YahooEarningsScraper {
    async fn fetch_earnings_page(
        &self,
        ticker: &str,
        offset: u32,
        limit: u32,
    ) -> Result<PageResponse, ScrapeError> {
        let size = resolve_page_size(limit)?;
        let url = self.earnings_url(ticker, offset, size);
        debug!("Fetching earnings page: {}", url);

        let response = self.fetcher.cache_get(&url).await?;
        response.error_for_status()?;
        Ok(response)
    }
}

/// Locate and normalize the earnings table embedded in a fetched page.
pub fn parse_table(html: &str) -> Result<EarningsTable, ScrapeError> {
    let raw_rows = parsers::parse_earnings_rows(html)?;
    cleaner::clean_earnings_rows(raw_rows)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_tiers() {
        for limit in 1..=25 {
            assert_eq!(resolve_page_size(limit).unwrap(), 25);
        }
        for limit in 26..=50 {
            assert_eq!(resolve_page_size(limit).unwrap(), 50);
        }
        for limit in 51..=100 {
            assert_eq!(resolve_page_size(limit).unwrap(), 100);
        }
    }

    #[test]
    fn test_page_size_rejects_out_of_range() {
        assert!(matches!(
            resolve_page_size(0),
            Err(ScrapeError::InvalidLimit(0))
        ));
        assert!(matches!(
            resolve_page_size(101),
            Err(ScrapeError::InvalidLimit(101))
        ));
    }

    #[test]
    fn test_earnings_url() {
        struct NoFetch;

        #[async_trait]
        impl CachedFetch for NoFetch {
            async fn cache_get(&self, _url: &str) -> Result<PageResponse, ScrapeError> {
                unreachable!("not fetched in this test")
            }
        }

        let config = ScraperConfig {
            base_url: "https://finance.yahoo.com/calendar/earnings/".to_string(),
            ..Default::default()
        };
        let scraper = YahooEarningsScraper::new(&config, Arc::new(NoFetch));
        assert_eq!(
            scraper.earnings_url("aapl", 0, 100),
            "https://finance.yahoo.com/calendar/earnings?symbol=AAPL&offset=0&size=100"
        );
    }

    #[test]
    fn test_invalid_limit_fails_before_fetch() {
        struct PanicFetch;

        #[async_trait]
        impl CachedFetch for PanicFetch {
            async fn cache_get(&self, url: &str) -> Result<PageResponse, ScrapeError> {
                panic!("network call issued for {}", url);
            }
        }

        let scraper =
            YahooEarningsScraper::new(&ScraperConfig::default(), Arc::new(PanicFetch));
        let err = tokio_test::block_on(scraper.fetch_earnings_page("AAPL", 0, 0));
        assert!(matches!(err, Err(ScrapeError::InvalidLimit(0))));
    }
}
