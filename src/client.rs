//! Caller-facing client
//!
//! [`DataClient`] wires the fetch pipeline together: limit discovery through
//! the registry, pagination planning, rate-gated scheduled execution and
//! final assembly. One client is meant to live for the process and be shared
//! across tasks; all fetch state is per call.

use crate::assemble::{assemble, AssembledTable};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::limits::{EndpointLimits, LimitProber, LimitRegistry};
use crate::plan;
use crate::rate::RateLimiter;
use crate::retry::{CancelFlag, PageFetcher, RetryPolicy};
use crate::scheduler::Scheduler;
use crate::transport::Transport;
use crate::types::{FetchOptions, FetchRequest};
use std::sync::Arc;
use tracing::{debug, info};

/// Client for fetching logical datasets from a rate-limited tabular API
pub struct DataClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    registry: Arc<LimitRegistry>,
    limiter: Arc<RateLimiter>,
    prober: LimitProber,
}

impl DataClient {
    /// Create a client with default configuration
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::builder(transport).build()
    }

    /// Create a builder over the given transport
    pub fn builder(transport: impl Transport + 'static) -> DataClientBuilder {
        DataClientBuilder {
            transport: Arc::new(transport),
            config: ClientConfig::default(),
        }
    }

    /// The client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The limit registry, for manual overrides and explicit resets
    pub fn registry(&self) -> &LimitRegistry {
        &self.registry
    }

    /// Forget and re-discover one endpoint's limits on next use
    pub fn reset_limits(&self, endpoint: &str) {
        self.registry.reset(endpoint);
    }

    /// Fetch a logical dataset: discover limits, plan pages, execute under
    /// the rate budget and return the merged table.
    pub async fn fetch(
        &self,
        request: FetchRequest,
        options: FetchOptions,
    ) -> Result<AssembledTable> {
        let limits = self
            .registry
            .get_or_probe(&request.endpoint, &self.prober)
            .await?;

        let fetcher = self.fetcher(&request, &options, Some(&limits));
        let row_limit = request.row_limit;

        if limits.is_row_uncapped() {
            debug!(endpoint = %request.endpoint, "endpoint uncapped, fetching in one call");
            let limit = (row_limit > 0).then(|| row_limit.min(u64::from(u32::MAX)) as u32);
            let page = fetcher.fetch_unbounded(limit).await?;
            return assemble(vec![page], row_limit);
        }

        let workers = options.max_workers.unwrap_or(self.config.max_workers);
        let scheduler = Scheduler::new(&fetcher, workers);
        let pages = if row_limit == 0 {
            scheduler
                .run_open_ended(limits.rows_per_call, options.concurrent)
                .await?
        } else {
            let descriptors = plan::plan(row_limit, limits.rows_per_call);
            debug!(
                endpoint = %request.endpoint,
                pages = descriptors.len(),
                rows_per_call = limits.rows_per_call,
                concurrent = options.concurrent,
                "planned fetch"
            );
            scheduler
                .run_bounded(descriptors, options.concurrent)
                .await?
        };

        let table = assemble(pages, row_limit)?;
        info!(
            endpoint = %request.endpoint,
            rows = table.len(),
            "fetch complete"
        );
        Ok(table)
    }

    /// Fetch with a single call, no pagination: the request's filters and
    /// row limit go to the server as-is. Retried like any page; rate
    /// limited only when the endpoint's limits are already known.
    pub async fn fetch_single(&self, request: FetchRequest) -> Result<AssembledTable> {
        let limits = self.registry.get(&request.endpoint);
        let fetcher = self.fetcher(&request, &FetchOptions::default(), limits.as_ref());
        let row_limit = request.row_limit;
        let limit = (row_limit > 0).then(|| row_limit.min(u64::from(u32::MAX)) as u32);
        let page = fetcher.fetch_unbounded(limit).await?;
        assemble(vec![page], row_limit)
    }

    fn fetcher(
        &self,
        request: &FetchRequest,
        options: &FetchOptions,
        limits: Option<&EndpointLimits>,
    ) -> PageFetcher {
        let limiter = if self.config.enable_rate_limit {
            if let Some(limits) = limits {
                self.limiter.register(limits);
            }
            Some(self.limiter.clone())
        } else {
            None
        };
        PageFetcher::new(
            self.transport.clone(),
            limiter,
            RetryPolicy::from_config(&self.config, options),
            request.clone(),
            CancelFlag::new(),
        )
    }
}

impl std::fmt::Debug for DataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataClient")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Builder for [`DataClient`]
pub struct DataClientBuilder {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

impl DataClientBuilder {
    /// Replace the whole configuration
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Worker-pool size for concurrent fetches
    #[must_use]
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.config.max_workers = workers;
        self
    }

    /// Retry budget per page
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Initial retry delay
    #[must_use]
    pub fn retry_delay(mut self, delay: std::time::Duration) -> Self {
        self.config.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Enable or bypass the rate limiter
    #[must_use]
    pub fn enable_rate_limit(mut self, enable: bool) -> Self {
        self.config.enable_rate_limit = enable;
        self
    }

    /// Declare an endpoint's frequency cap upfront (calls per window)
    #[must_use]
    pub fn declared_rate(mut self, endpoint: impl Into<String>, calls_per_window: u32) -> Self {
        self.config
            .declared_rates
            .insert(endpoint.into(), calls_per_window);
        self
    }

    /// Parameters an endpoint requires even for the minimal probe call
    #[must_use]
    pub fn probe_params(
        mut self,
        endpoint: impl Into<String>,
        params: crate::types::FilterMap,
    ) -> Self {
        self.config.probe_params.insert(endpoint.into(), params);
        self
    }

    /// Persist probed limits to a JSON file across processes
    #[must_use]
    pub fn limits_cache(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config.limits_cache_path = Some(path.into());
        self
    }

    /// Build the client
    pub fn build(self) -> DataClient {
        let registry = match &self.config.limits_cache_path {
            Some(path) => LimitRegistry::with_cache(path.clone()),
            None => LimitRegistry::new(),
        };
        let prober = LimitProber::new(self.transport.clone(), &self.config);
        DataClient {
            transport: self.transport,
            config: self.config,
            registry: Arc::new(registry),
            limiter: Arc::new(RateLimiter::new()),
            prober,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TableTransport;
    use std::time::Duration;

    #[test]
    fn test_builder_applies_knobs() {
        let client = DataClient::builder(TableTransport::new(0))
            .max_workers(8)
            .max_retries(5)
            .retry_delay(Duration::from_millis(100))
            .enable_rate_limit(false)
            .declared_rate("daily", 500)
            .build();

        assert_eq!(client.config().max_workers, 8);
        assert_eq!(client.config().max_retries, 5);
        assert_eq!(client.config().retry_delay_ms, 100);
        assert!(!client.config().enable_rate_limit);
        assert_eq!(client.config().declared_rates.get("daily"), Some(&500));
    }

    #[tokio::test]
    async fn test_manual_limits_bypass_probe() {
        let transport = Arc::new(TableTransport::new(2500).with_cap(1000));
        let client = DataClient::builder(transport.clone())
            .enable_rate_limit(false)
            .build();

        client.registry().insert(EndpointLimits::new(
            "daily",
            1000,
            0,
            Duration::from_secs(60),
        ));

        let table = client
            .fetch(FetchRequest::new("daily"), FetchOptions::sequential())
            .await
            .unwrap();

        assert_eq!(table.len(), 2500);
        // Three pages, no probe call.
        assert_eq!(transport.calls(), 3);
    }
}
