// src/services/fetcher.rs

//! Rate-limited HTTP fetching with jittered exponential backoff.
//!
//! Every request, from every worker, first waits on one shared
//! [`governor`] limiter, so the configured rate caps the aggregate request
//! rate. Random jitter is spent *before* asking for a permit, which keeps
//! the observed request timestamps inside the quota.

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rand::Rng;

use crate::error::{AppError, FetchError, Result};
use crate::models::{CrawlerConfig, FetchRecord};
use crate::utils::content_hash;

/// Status, body and retry hint of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// Parsed `Retry-After`, seconds form only
    pub retry_after: Option<Duration>,
}

impl RawResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            retry_after: None,
        }
    }
}

/// One GET request. Implementations do no retrying or rate limiting.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform a single GET. Connection-level failures are `Transient`.
    async fn get(&self, url: &str) -> std::result::Result<RawResponse, FetchError>;
}

/// `reqwest`-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> std::result::Result<RawResponse, FetchError> {
        let classify = |e: reqwest::Error| {
            if e.is_builder() {
                FetchError::Invalid {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            } else {
                FetchError::Transient {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let response = self.client.get(url).send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.bytes().await.map_err(classify)?.to_vec();

        Ok(RawResponse {
            status,
            body,
            retry_after,
        })
    }
}

/// A successfully fetched page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: Vec<u8>,
    pub content_hash: String,
}

impl FetchedPage {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Retry schedule: `base * 2^(n-1)` after the n-th failure plus up to a fifth
/// of that as jitter, never more than `max` in total.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: Duration::from_millis(config.backoff_base_ms),
            max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Un-jittered delay after `failures` failed attempts.
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay actually slept, honouring a server `Retry-After` up to the cap.
    fn delay(&self, failures: u32, retry_after: Option<Duration>) -> Duration {
        let capped = match retry_after {
            Some(hint) => self.backoff(failures).max(hint.min(self.max)),
            None => self.backoff(failures),
        };
        let jitter_ms = capped.as_millis() as u64 / 5;
        if jitter_ms == 0 {
            return capped;
        }
        (capped + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))).min(self.max)
    }
}

/// HTTP fetcher enforcing a shared request-rate cap and bounded retries.
pub struct RateLimitedFetcher {
    transport: Arc<dyn Transport>,
    limiter: DefaultDirectRateLimiter,
    jitter: Duration,
    policy: RetryPolicy,
    records: Mutex<BTreeMap<String, FetchRecord>>,
}

impl RateLimitedFetcher {
    /// Create a fetcher from crawler settings.
    pub fn new(transport: Arc<dyn Transport>, config: &CrawlerConfig) -> Result<Self> {
        let interval = Duration::from_secs_f64(1.0 / config.requests_per_second);
        Ok(Self {
            transport,
            limiter: Self::limiter(interval)?,
            jitter: Duration::from_millis(config.jitter_ms),
            policy: RetryPolicy::from_config(config),
            records: Mutex::new(BTreeMap::new()),
        })
    }

    fn limiter(interval: Duration) -> Result<DefaultDirectRateLimiter> {
        let quota = Quota::with_period(interval)
            .ok_or_else(|| AppError::config("request interval must be > 0"))?
            .allow_burst(NonZeroU32::MIN);
        Ok(RateLimiter::direct(quota))
    }

    /// Slow down to at most one request per `interval` (robots Crawl-delay).
    /// Has no effect when the current rate is already slower.
    pub fn slow_to(&mut self, interval: Duration, current_rps: f64) -> Result<()> {
        if interval.as_secs_f64() * current_rps > 1.0 {
            log::info!(
                "Honouring crawl delay of {:.1}s between requests",
                interval.as_secs_f64()
            );
            self.limiter = Self::limiter(interval)?;
        }
        Ok(())
    }

    /// Wait for jitter, then for a permit from the shared quota.
    async fn acquire(&self) {
        if !self.jitter.is_zero() {
            let ms = rand::rng().random_range(0..=self.jitter.as_millis() as u64);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        self.limiter.until_ready().await;
    }

    /// Fetch `url`, retrying 429/5xx and connection failures with backoff.
    ///
    /// A URL that keeps failing transiently is attempted exactly
    /// `max_attempts` times before yielding [`FetchError::Exhausted`].
    pub async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError> {
        let mut failures = 0u32;

        loop {
            self.acquire().await;
            let outcome = self.transport.get(url).await;

            let (reason, retry_after) = match outcome {
                Ok(response) if (200..300).contains(&response.status) => {
                    let hash = content_hash(&response.body);
                    self.note(url, Some(response.status), Some(hash.clone()));
                    return Ok(FetchedPage {
                        url: url.to_string(),
                        status: response.status,
                        body: response.body,
                        content_hash: hash,
                    });
                }
                Ok(response) if response.status == 429 || response.status >= 500 => {
                    self.note(url, Some(response.status), None);
                    (format!("HTTP {}", response.status), response.retry_after)
                }
                Ok(response) => {
                    let attempts = self.note(url, Some(response.status), None);
                    return Err(FetchError::Rejected {
                        url: url.to_string(),
                        status: response.status,
                        attempts,
                    });
                }
                Err(FetchError::Transient { reason, .. }) => {
                    self.note(url, None, None);
                    (reason, None)
                }
                Err(other) => {
                    self.note(url, None, None);
                    return Err(other);
                }
            };

            failures += 1;
            if failures >= self.policy.max_attempts {
                log::warn!("Giving up on {url} after {failures} attempts ({reason})");
                return Err(FetchError::Exhausted {
                    url: url.to_string(),
                    attempts: failures,
                    last: reason,
                });
            }

            let delay = self.policy.delay(failures, retry_after);
            log::debug!(
                "Retrying {url} ({}/{}) in {}ms: {reason}",
                failures + 1,
                self.policy.max_attempts,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Bump the attempt counter of `url`'s record; returns the new count.
    fn note(&self, url: &str, status: Option<u16>, hash: Option<String>) -> u32 {
        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        let record = records
            .entry(url.to_string())
            .or_insert_with(|| FetchRecord::new(url));
        record.attempt_count += 1;
        record.fetched_at = Utc::now();
        if status.is_some() {
            record.http_status = status;
        }
        if hash.is_some() {
            record.content_hash = hash;
        }
        record.attempt_count
    }

    /// Fetch record for `url`, if it was requested this run.
    pub fn record(&self, url: &str) -> Option<FetchRecord> {
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        records.get(url).cloned()
    }

    /// All fetch records of this run, sorted by URL.
    pub fn records(&self) -> Vec<FetchRecord> {
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        records.values().cloned().collect()
    }
}
