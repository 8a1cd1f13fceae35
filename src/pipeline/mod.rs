//! Pipeline orchestrator: ties consent gate → table extractor together.
//!
//! The two components never call each other; this glue drives the cycle:
//!   1. Fetch the earnings page through the cached-GET collaborator
//!   2. If the response landed on the consent host, submit the acceptance
//!      form and refetch — one detect-and-submit step per round, bounded
//!      by `consent.max_rounds`
//!   3. Parse the (eventually) real page into an `EarningsTable`
//!
//! Each run is stateless apart from the shared HTTP session's cookie jar,
//! which is what makes the acceptance stick across the refetch.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::consent;
use crate::models::EarningsTable;
use crate::scraper::http_client::HttpClient;
use crate::scraper::{self, CachedFetch, EarningsSource, YahooEarningsScraper};

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, ticker: &str, offset: u32, limit: u32) -> Result<PipelineRun> {
        let client = Arc::new(
            HttpClient::new(&self.config.scraper).context("Failed to build HTTP client")?,
        );
        let source = YahooEarningsScraper::new(
            &self.config.scraper,
            Arc::clone(&client) as Arc<dyn CachedFetch>,
        );

        let submit_timeout = Duration::from_secs(self.config.consent.submit_timeout_secs);

        // ── 1+2. Fetch, clearing the consent wall if it interposes ────────────
        let mut response = source
            .fetch_earnings_page(ticker, offset, limit)
            .await
            .context("Earnings page fetch failed")?;

        let mut consent_rounds = 0u32;
        while consent::is_consent_url(&response.url) {
            if consent_rounds >= self.config.consent.max_rounds {
                bail!(
                    "Consent wall still up after {} rounds ({})",
                    consent_rounds,
                    response.url
                );
            }
            consent_rounds += 1;
            info!(
                "Consent interstitial detected ({}), submitting acceptance (round {})",
                response.url, consent_rounds
            );

            let cleared = consent::submit(client.as_ref(), &response, submit_timeout).await?;
            debug!("Consent submission landed on {}", cleared.url);

            response = source
                .fetch_earnings_page(ticker, offset, limit)
                .await
                .context("Refetch after consent submission failed")?;
        }

        // ── 3. Normalize ──────────────────────────────────────────────────────
        let table = scraper::parse_table(&response.text)
            .with_context(|| format!("Failed to parse earnings table for {}", ticker))?;

        if table.is_empty() {
            warn!("{}: earnings table present but empty", ticker);
        }

        Ok(PipelineRun {
            table,
            consent_rounds,
        })
    }
}

#[derive(Debug)]
pub struct PipelineRun {
    pub table: EarningsTable,
    pub consent_rounds: u32,
}
