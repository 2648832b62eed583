//! Retry and backoff around a single page fetch
//!
//! [`PageFetcher`] is the explicit retry state machine: every attempt checks
//! the shared cancellation flag, acquires a fresh rate token (a retry never
//! bypasses the limiter), calls the transport and classifies the outcome.
//! Throttling failures additionally tighten the limiter before backing off.
//! A fatal failure raises the cancellation flag so sibling workers stop
//! before starting new calls.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::plan::PageDescriptor;
use crate::rate::RateLimiter;
use crate::transport::{RawPage, Transport};
use crate::types::{BackoffType, FetchOptions, FetchRequest, PageResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

// ============================================================================
// Retry Policy
// ============================================================================

/// Retry budget and backoff schedule for one fetch
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = `max_retries + 1`)
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Delay growth across attempts
    pub backoff: BackoffType,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff: BackoffType::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Build the policy from client config with per-call overrides
    pub fn from_config(config: &ClientConfig, options: &FetchOptions) -> Self {
        Self {
            max_retries: options.max_retries.unwrap_or(config.max_retries),
            initial_delay: options.retry_delay.unwrap_or_else(|| config.retry_delay()),
            max_delay: config.max_backoff(),
            backoff: config.backoff,
        }
    }

    /// Delay before retry number `attempt` (0-based), capped at `max_delay`
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            BackoffType::Constant => self.initial_delay,
            BackoffType::Linear => self.initial_delay * (attempt + 1),
            BackoffType::Exponential => self.initial_delay * 2u32.saturating_pow(attempt),
        };
        delay.min(self.max_delay)
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Shared cancellation flag for one logical fetch. Raised by the first
/// fatal failure; checked before every token acquisition and after every
/// backoff sleep, so no new network call starts once it is set.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the flag is raised
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Page Fetcher
// ============================================================================

/// Fetches single pages of one logical request, with retry, rate gating and
/// cooperative cancellation
pub struct PageFetcher {
    transport: Arc<dyn Transport>,
    limiter: Option<Arc<RateLimiter>>,
    policy: RetryPolicy,
    request: FetchRequest,
    cancel: CancelFlag,
}

impl PageFetcher {
    /// Create a fetcher for one logical request. `limiter` is `None` when
    /// rate limiting is bypassed.
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: Option<Arc<RateLimiter>>,
        policy: RetryPolicy,
        request: FetchRequest,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            transport,
            limiter,
            policy,
            request,
            cancel,
        }
    }

    /// The shared cancellation flag of this fetch
    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Fetch one planned page
    pub async fn fetch(&self, desc: &PageDescriptor) -> Result<PageResult> {
        let raw = self.fetch_raw(desc.offset, Some(desc.rows)).await?;
        Ok(self.page_result(desc.seq, desc.offset, desc.rows, raw))
    }

    /// Fetch the whole dataset in one call (uncapped endpoints and
    /// single-call passthrough). `limit = None` lets the server decide.
    pub async fn fetch_unbounded(&self, limit: Option<u32>) -> Result<PageResult> {
        let raw = self.fetch_raw(0, limit).await?;
        Ok(self.page_result(0, 0, limit.unwrap_or(0), raw))
    }

    fn page_result(&self, seq: usize, offset: u64, requested: u32, raw: RawPage) -> PageResult {
        PageResult {
            seq,
            offset,
            requested,
            columns: raw.columns,
            rows: raw.rows,
            has_more: raw.has_more,
        }
    }

    async fn fetch_raw(&self, offset: u64, limit: Option<u32>) -> Result<RawPage> {
        let endpoint = &self.request.endpoint;
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_set() {
                return Err(Error::Cancelled);
            }
            if let Some(limiter) = &self.limiter {
                limiter.acquire(endpoint).await;
            }

            match self
                .transport
                .call(
                    endpoint,
                    &self.request.fields,
                    &self.request.filters,
                    offset,
                    limit,
                )
                .await
            {
                Ok(raw) => {
                    if let Some(limiter) = &self.limiter {
                        limiter.report_success(endpoint);
                    }
                    return Ok(raw);
                }
                Err(e) if e.is_retryable() => {
                    if e.is_throttling() {
                        if let Some(limiter) = &self.limiter {
                            limiter.report_throttled(endpoint);
                        }
                    }
                    if attempt >= self.policy.max_retries {
                        self.cancel.set();
                        return Err(Error::RetriesExhausted {
                            endpoint: endpoint.clone(),
                            offset,
                            attempts: attempt + 1,
                            last_cause: e.to_string(),
                        });
                    }
                    let delay = self.policy.delay(attempt);
                    warn!(
                        endpoint,
                        offset,
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "page fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.cancel.set();
                    return Err(e);
                }
            }
        }
    }
}
