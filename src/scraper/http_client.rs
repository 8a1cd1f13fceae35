use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::RngExt;
use reqwest::header::REFERER;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;
use url::Url;

use crate::config::ScraperConfig;
use crate::consent::{AcceptancePayload, HttpSession};
use crate::models::PageResponse;

use super::{CachedFetch, ScrapeError};

pub struct HttpClient {
    inner: reqwest::Client,
    config: ScraperConfig,
    cache: Mutex<HashMap<String, PageResponse>>,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Accept cookies so the consent acknowledgment sticks to the session
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            config: config.clone(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// One GET, redirects followed, body read as text. No retry: a failed
    /// fetch propagates to the caller as-is.
    async fn get_page(&self, url: &str) -> Result<PageResponse, ScrapeError> {
        self.polite_delay().await;
        debug!("GET {}", url);

        let resp = self.inner.get(url).send().await?;
        let status = resp.status();
        let final_url = resp.url().to_string();
        let text = resp.text().await?;

        Ok(PageResponse {
            url: final_url,
            status,
            text,
        })
    }

    /// Sleep for the configured delay + random jitter.
    async fn polite_delay(&self) {
        let jitter = rand::rng().random_range(0..=self.config.jitter_ms);
        let total = Duration::from_millis(self.config.request_delay_ms + jitter);
        sleep(total).await;
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

/// A response that landed on a different host than requested is a redirect
/// target (typically an interstitial), not the requested resource.
fn same_host(request_url: &str, response_url: &str) -> bool {
    match (host_of(request_url), host_of(response_url)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[async_trait]
impl CachedFetch for HttpClient {
    async fn cache_get(&self, url: &str) -> Result<PageResponse, ScrapeError> {
        if let Some(hit) = self.cache.lock().await.get(url) {
            debug!("Cache hit for {}", url);
            return Ok(hit.clone());
        }

        let response = self.get_page(url).await?;

        if response.status.is_success() && same_host(url, &response.url) {
            self.cache
                .lock()
                .await
                .insert(url.to_string(), response.clone());
        }

        Ok(response)
    }
}

#[async_trait]
impl HttpSession for HttpClient {
    async fn post_form(
        &self,
        url: &str,
        payload: &AcceptancePayload,
        referer: &str,
        timeout: Duration,
    ) -> Result<PageResponse> {
        debug!("POST {} (referer: {})", url, referer);

        let resp = self
            .inner
            .post(url)
            .header(REFERER, referer)
            .form(payload)
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        let status = resp.status();
        let final_url = resp.url().to_string();
        let text = resp.text().await.context("Failed to read response body")?;

        Ok(PageResponse {
            url: final_url,
            status,
            text,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
