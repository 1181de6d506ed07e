//! Rate-limited HTTP client for the SEC EDGAR endpoints this crate needs:
//! the company ticker table, the browse-edgar Atom filing listings, and the
//! filing pages that link to XBRL instance documents.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use governor::{
    Quota, RateLimiter, clock::DefaultClock, middleware::NoOpMiddleware, state::InMemoryState,
    state::NotKeyed,
};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::cache::TickerCache;
use crate::config::{ClientConfig, EdgarUrls};
use crate::error::{ExtractError, Result};
use crate::traits::FilingOperations;

const MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF_MS: u64 = 1000;

type Governor = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// One filing entry from the browse-edgar Atom listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Filing {
    /// Accession number, e.g. `0000080661-24-000042`.
    pub accession: String,
    /// Absolute URL of the filing index page.
    pub filing_url: String,
    /// Filing date, when the feed carried one.
    pub date: Option<NaiveDate>,
}

/// HTTP client for SEC EDGAR with built-in rate limiting and retry logic.
///
/// The SEC's fair access rules limit automated clients to 10 requests per
/// second; a token bucket enforces that ceiling, and 429 responses or
/// transient network failures are retried with exponential backoff and
/// jitter. The ticker cache passed to the constructor is consulted before
/// any network lookup and updated on successful resolution; callers own its
/// load/save lifecycle via [`TickerCache`] and [`SecClient::save_cache`].
#[derive(Debug)]
pub struct SecClient {
    client: reqwest::Client,
    rate_limiter: Arc<Governor>,
    urls: EdgarUrls,
    cache: Mutex<TickerCache>,
}

impl SecClient {
    /// Creates a client with default settings and the given ticker cache.
    ///
    /// The user agent should identify your application and a contact
    /// address, e.g. `"my_app/1.0 (me@example.com)"` — the SEC requires it.
    pub fn new(user_agent: &str, cache: TickerCache) -> Result<Self> {
        let config = ClientConfig {
            user_agent: user_agent.to_string(),
            ..ClientConfig::default()
        };
        Self::with_config(config, cache)
    }

    /// Creates a client with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Config`] if the user agent is malformed, the
    /// rate limit is zero, or the HTTP client cannot be built.
    pub fn with_config(config: ClientConfig, cache: TickerCache) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| ExtractError::Config(format!("invalid user agent: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExtractError::Config(format!("failed to build HTTP client: {e}")))?;

        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(
            NonZeroU32::new(config.rate_limit).ok_or_else(|| {
                ExtractError::Config("rate limit must be greater than zero".to_string())
            })?,
        )));

        Ok(Self {
            client,
            rate_limiter,
            urls: config.base_urls,
            cache: Mutex::new(cache),
        })
    }

    /// Persists the current ticker cache contents.
    pub fn save_cache(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        self.lock_cache().save(path)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, TickerCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Exponential backoff with ±20% jitter: `(2^retry × 1000ms) ± 20%`.
    fn calculate_backoff(retry: u32) -> Duration {
        let backoff_ms = INITIAL_BACKOFF_MS * (2_u64.pow(retry));
        let jitter = (backoff_ms as f64 * 0.2 * (fastrand::f64() - 0.5)) as i64;
        Duration::from_millis((backoff_ms as i64 + jitter) as u64)
    }

    /// Fetches text content with rate limiting and retries.
    ///
    /// Rate-limit responses (429) and network failures are retried up to 5
    /// times with exponential backoff, respecting `Retry-After` when the
    /// server sends one. 404 maps to [`ExtractError::NotFound`]; other
    /// statuses return immediately as [`ExtractError::InvalidResponse`].
    pub async fn get(&self, url: &str) -> Result<String> {
        let mut retries = 0;

        loop {
            self.rate_limiter.until_ready().await;

            let response = match self.client.get(url).send().await {
                Ok(response) => response,
                Err(e) => {
                    if retries >= MAX_RETRIES {
                        return Err(ExtractError::Request(e));
                    }
                    let backoff = Self::calculate_backoff(retries);
                    tracing::warn!(
                        url,
                        attempt = retries + 1,
                        "request failed: {e}; retrying in {backoff:?}"
                    );
                    sleep(backoff).await;
                    retries += 1;
                    continue;
                }
            };

            match response.status() {
                reqwest::StatusCode::OK => {
                    return response.text().await.map_err(ExtractError::Request);
                }
                reqwest::StatusCode::NOT_FOUND => {
                    return Err(ExtractError::NotFound);
                }
                reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    if retries >= MAX_RETRIES {
                        return Err(ExtractError::RateLimitExceeded);
                    }
                    let retry_after = response
                        .headers()
                        .get("retry-after")
                        .and_then(|h| h.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| Self::calculate_backoff(retries));
                    tracing::warn!(
                        url,
                        attempt = retries + 1,
                        "rate limit hit (429); waiting {retry_after:?} before retry"
                    );
                    sleep(retry_after).await;
                    retries += 1;
                }
                status => {
                    return Err(ExtractError::InvalidResponse(format!(
                        "unexpected status code {status} for URL {url}"
                    )));
                }
            }
        }
    }

    fn absolutize(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else if href.starts_with('/') {
            format!("{}{}", self.urls.base, href)
        } else {
            format!("{}/{}", self.urls.base, href)
        }
    }
}

/// Row shape of the SEC company ticker table.
#[derive(Debug, Deserialize)]
struct TickerRow {
    cik_str: u64,
    ticker: String,
}

#[derive(Debug, Serialize)]
struct BrowseQuery<'a> {
    action: &'a str,
    #[serde(rename = "CIK")]
    cik: &'a str,
    #[serde(rename = "type")]
    form: &'a str,
    owner: &'a str,
    start: usize,
    count: usize,
    output: &'a str,
}

#[derive(Debug, Deserialize)]
struct FeedDoc {
    #[serde(rename = "entry", default)]
    entries: Vec<FeedEntry>,
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    id: String,
    updated: Option<String>,
    #[serde(rename = "link", default)]
    links: Vec<FeedLink>,
}

#[derive(Debug, Deserialize)]
struct FeedLink {
    #[serde(rename = "@href")]
    href: String,
}

/// Pulls the accession number out of an Atom entry id of the form
/// `urn:...accession-number=0000080661-24-000042`.
fn accession_from_id(id: &str) -> Option<String> {
    let (_, rest) = id.split_once("accession-number=")?;
    let accession: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    // dddddddddd-dd-dddddd
    if accession.len() == 20 {
        Some(accession)
    } else {
        None
    }
}

/// Finds the first link to an extracted XBRL instance document
/// (`*_htm.xml`) in a filing index page.
fn find_instance_link(html: &str) -> Option<String> {
    for chunk in html.split("href=\"").skip(1) {
        if let Some(end) = chunk.find('"') {
            let href = &chunk[..end];
            if href.to_ascii_lowercase().ends_with("_htm.xml") {
                return Some(href.to_string());
            }
        }
    }
    None
}

fn filing_date(updated: Option<&str>) -> Option<NaiveDate> {
    let raw = updated?.get(..10)?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

#[async_trait]
impl FilingOperations for SecClient {
    async fn company_cik(&self, ticker: &str) -> Result<String> {
        if let Some(cik) = self.lock_cache().get(ticker) {
            return Ok(cik.to_string());
        }

        let url = format!("{}/company_tickers.json", self.urls.files);
        let body = self.get(&url).await?;
        let table: HashMap<String, TickerRow> = serde_json::from_str(&body)?;

        let row = table
            .values()
            .find(|row| row.ticker.eq_ignore_ascii_case(ticker))
            .ok_or_else(|| ExtractError::TickerNotFound(ticker.to_string()))?;
        let cik = row.cik_str.to_string();

        self.lock_cache().insert(ticker, cik.clone());
        tracing::debug!(ticker, cik, "resolved ticker");
        Ok(cik)
    }

    async fn filings(&self, cik: &str, form: &str, count: usize) -> Result<Vec<Filing>> {
        let query = serde_urlencoded::to_string(BrowseQuery {
            action: "getcompany",
            cik,
            form,
            owner: "exclude",
            start: 0,
            count,
            output: "atom",
        })
        .map_err(|e| ExtractError::InvalidResponse(format!("bad query: {e}")))?;
        let url = format!("{}?{}", self.urls.browse, query);

        let body = self.get(&url).await?;
        let feed: FeedDoc = quick_xml::de::from_str(&body)?;

        let mut out = Vec::new();
        for entry in feed.entries {
            let Some(accession) = accession_from_id(&entry.id) else {
                continue;
            };
            let Some(link) = entry.links.first() else {
                continue;
            };
            out.push(Filing {
                accession,
                filing_url: self.absolutize(&link.href),
                date: filing_date(entry.updated.as_deref()),
            });
        }
        tracing::debug!(cik, form, filings = out.len(), "listed filings");
        Ok(out)
    }

    async fn instance_document_url(&self, filing_url: &str) -> Result<String> {
        let html = self.get(filing_url).await?;
        find_instance_link(&html)
            .map(|href| self.absolutize(&href))
            .ok_or_else(|| {
                ExtractError::InvalidResponse(format!(
                    "no XBRL instance document link on filing page {filing_url}"
                ))
            })
    }

    async fn fetch_instance(&self, url: &str) -> Result<String> {
        self.get(url).await
    }
}
