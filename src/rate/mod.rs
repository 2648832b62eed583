//! Adaptive rate limiting
//!
//! Uses the governor crate for token bucket rate limiting, keyed by
//! endpoint. Buckets are built with even spacing (one token per
//! `window / calls_per_window`), so no sliding window of `window` ever
//! admits more than `calls_per_window` acquisitions at any concurrency
//! level.
//!
//! On top of the bucket sits an explicit pacing state machine. A server
//! throttling signal (despite our local accounting) halves the effective
//! rate and enters a cooldown; sustained success afterwards steps the rate
//! back up to nominal.

use crate::limits::EndpointLimits;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

type Bucket = Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Hard ceiling on the pacing slowdown (8x the nominal call spacing)
const MAX_SLOWDOWN: u32 = 8;

/// Consecutive successes required per recovery step
const RECOVERY_STREAK: u32 = 8;

/// Pacing state of one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pace {
    /// Nominal configured rate
    Normal,
    /// Recently throttled by the server; rate reduced, waiting out the
    /// cooldown interval
    Cooling { since: Instant },
    /// Cooldown elapsed; counting successes toward restoring the rate
    Recovering { streak: u32 },
}

struct EndpointPace {
    /// Nominal spacing between calls
    base_period: Duration,
    /// How long a throttling signal suppresses recovery
    cooldown: Duration,
    /// Current bucket; swapped out when the slowdown factor changes
    bucket: Mutex<Arc<Bucket>>,
    state: Mutex<PaceState>,
}

struct PaceState {
    pace: Pace,
    slowdown: u32,
}

fn build_bucket(period: Duration) -> Option<Arc<Bucket>> {
    Quota::with_period(period).map(|quota| Arc::new(Governor::direct(quota)))
}

impl EndpointPace {
    fn new(base_period: Duration, cooldown: Duration) -> Option<Self> {
        let bucket = build_bucket(base_period)?;
        Some(Self {
            base_period,
            cooldown,
            bucket: Mutex::new(bucket),
            state: Mutex::new(PaceState {
                pace: Pace::Normal,
                slowdown: 1,
            }),
        })
    }

    async fn acquire(&self) {
        let bucket = self.bucket.lock().unwrap().clone();
        bucket.until_ready().await;
    }

    fn set_slowdown(&self, slowdown: u32) {
        if let Some(bucket) = build_bucket(self.base_period * slowdown) {
            *self.bucket.lock().unwrap() = bucket;
        }
    }

    fn throttled(&self, endpoint: &str) {
        let mut state = self.state.lock().unwrap();
        if state.slowdown < MAX_SLOWDOWN {
            state.slowdown *= 2;
            self.set_slowdown(state.slowdown);
        }
        state.pace = Pace::Cooling {
            since: Instant::now(),
        };
        warn!(
            endpoint,
            slowdown = state.slowdown,
            "server throttled despite local budget, reducing rate"
        );
    }

    fn succeeded(&self, endpoint: &str) {
        let mut state = self.state.lock().unwrap();
        match state.pace {
            Pace::Normal => {}
            Pace::Cooling { since } => {
                if since.elapsed() >= self.cooldown {
                    state.pace = Pace::Recovering { streak: 1 };
                }
            }
            Pace::Recovering { streak } => {
                let streak = streak + 1;
                if streak >= RECOVERY_STREAK && state.slowdown > 1 {
                    state.slowdown /= 2;
                    self.set_slowdown(state.slowdown);
                    debug!(
                        endpoint,
                        slowdown = state.slowdown,
                        "sustained success, restoring rate"
                    );
                    state.pace = if state.slowdown == 1 {
                        Pace::Normal
                    } else {
                        Pace::Recovering { streak: 0 }
                    };
                } else if state.slowdown == 1 {
                    state.pace = Pace::Normal;
                } else {
                    state.pace = Pace::Recovering { streak };
                }
            }
        }
    }

    fn slowdown(&self) -> u32 {
        self.state.lock().unwrap().slowdown
    }
}

/// Endpoint-keyed adaptive rate limiter
pub struct RateLimiter {
    endpoints: RwLock<HashMap<String, Arc<EndpointPace>>>,
}

impl RateLimiter {
    /// Create an empty limiter; endpoints appear via [`register`](Self::register)
    pub fn new() -> Self {
        Self {
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    /// Install a bucket for the endpoint from its limit facts. A second
    /// registration for the same endpoint is a no-op, preserving any
    /// adaptive state already accumulated. Endpoints without a frequency
    /// cap get no bucket and acquire for free.
    pub fn register(&self, limits: &EndpointLimits) {
        if limits.is_rate_unlimited() {
            return;
        }
        {
            let endpoints = self.endpoints.read().unwrap();
            if endpoints.contains_key(&limits.endpoint) {
                return;
            }
        }
        let period = limits.window / limits.calls_per_window;
        if let Some(pace) = EndpointPace::new(period, limits.window) {
            self.endpoints
                .write()
                .unwrap()
                .entry(limits.endpoint.clone())
                .or_insert_with(|| Arc::new(pace));
        }
    }

    fn pace(&self, endpoint: &str) -> Option<Arc<EndpointPace>> {
        self.endpoints.read().unwrap().get(endpoint).cloned()
    }

    /// Wait until the endpoint's budget admits one call. Unregistered
    /// endpoints are admitted immediately.
    pub async fn acquire(&self, endpoint: &str) {
        if let Some(pace) = self.pace(endpoint) {
            pace.acquire().await;
        }
    }

    /// Record a server throttling signal: halve the effective rate (down to
    /// the 8x-slowdown floor) and start a cooldown
    pub fn report_throttled(&self, endpoint: &str) {
        if let Some(pace) = self.pace(endpoint) {
            pace.throttled(endpoint);
        }
    }

    /// Record a successful call, feeding rate recovery
    pub fn report_success(&self, endpoint: &str) {
        if let Some(pace) = self.pace(endpoint) {
            pace.succeeded(endpoint);
        }
    }

    /// Current pacing factor for an endpoint (1 = nominal rate)
    pub fn slowdown_factor(&self, endpoint: &str) -> u32 {
        self.pace(endpoint).map_or(1, |pace| pace.slowdown())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("endpoints", &self.endpoints.read().unwrap().len())
            .finish()
    }
}
