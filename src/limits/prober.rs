//! Limit discovery
//!
//! One minimal call per unknown endpoint establishes its row cap. The
//! frequency cap is never probed by hammering the endpoint; it comes from
//! the caller-declared rate when configured, else a conservative default,
//! and the rate limiter tightens reactively if the server still objects.

use super::EndpointLimits;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::transport::{RawPage, Transport};
use crate::types::FilterMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const PROBE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Discovers an endpoint's limits with a single minimal call
pub struct LimitProber {
    transport: Arc<dyn Transport>,
    probe_params: HashMap<String, FilterMap>,
    declared_rates: HashMap<String, u32>,
    default_rows_per_call: u32,
    default_calls_per_window: u32,
    window: Duration,
    retries: u32,
}

impl LimitProber {
    /// Create a prober over the given transport and client configuration
    pub fn new(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            probe_params: config.probe_params.clone(),
            declared_rates: config.declared_rates.clone(),
            default_rows_per_call: config.default_rows_per_call,
            default_calls_per_window: config.default_calls_per_window,
            window: config.window(),
            retries: config.probe_retries,
        }
    }

    /// Probe one endpoint, failing with [`Error::Probe`] once the probe's
    /// own retry budget is spent
    pub async fn probe(&self, endpoint: &str) -> Result<EndpointLimits> {
        debug!(endpoint, "probing endpoint limits");

        let calls_per_window = self
            .declared_rates
            .get(endpoint)
            .copied()
            .unwrap_or(self.default_calls_per_window);

        let empty = FilterMap::new();
        let params = self.probe_params.get(endpoint).unwrap_or(&empty);

        let mut attempt: u32 = 0;
        let rows_per_call = loop {
            match self.transport.call(endpoint, &[], params, 0, None).await {
                Ok(page) => break self.infer_row_cap(endpoint, &page),
                Err(e) if e.is_throttling() => {
                    // The probe itself got throttled: the endpoint is
                    // clearly rate limited, and hammering it further to
                    // learn the row cap would make things worse. Assume
                    // defaults and let the limiter adapt.
                    warn!(endpoint, "probe throttled, assuming default limits");
                    break self.default_rows_per_call;
                }
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    warn!(endpoint, attempt, error = %e, "probe call failed, retrying");
                    tokio::time::sleep(PROBE_RETRY_DELAY).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(Error::probe(endpoint, e.to_string()));
                }
            }
        };

        let limits = EndpointLimits::new(endpoint, rows_per_call, calls_per_window, self.window);
        info!(
            endpoint,
            rows_per_call = limits.rows_per_call,
            calls_per_window = limits.calls_per_window,
            "endpoint limits established"
        );
        Ok(limits)
    }

    /// Infer the row cap from an unbounded response. An explicit `has_more`
    /// flag is authoritative; without it, a count that is a positive
    /// multiple of 1000 is read as the server clipping the response, and
    /// anything else as the full dataset.
    fn infer_row_cap(&self, endpoint: &str, page: &RawPage) -> u32 {
        let count = page.rows.len() as u32;
        match page.has_more {
            Some(false) => {
                debug!(endpoint, count, "probe saw complete dataset, no row cap");
                0
            }
            Some(true) => {
                if count == 0 {
                    // Server claims more data but returned none; don't
                    // trust a zero cap.
                    self.default_rows_per_call
                } else {
                    count
                }
            }
            None => {
                if count > 0 && count % 1000 == 0 {
                    count
                } else {
                    debug!(endpoint, count, "probe count not cap-shaped, no row cap");
                    0
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FailKind, TableTransport};

    fn prober_over(transport: TableTransport) -> LimitProber {
        LimitProber::new(Arc::new(transport), &ClientConfig::default())
    }

    #[tokio::test]
    async fn test_probe_infers_cap_from_has_more() {
        // 12000 rows behind a 5000-row server cap: probe sees 5000 rows and
        // has_more = true.
        let prober = prober_over(TableTransport::new(12_000).with_cap(5000));
        let limits = prober.probe("daily").await.unwrap();
        assert_eq!(limits.rows_per_call, 5000);
        assert_eq!(limits.calls_per_window, 60);
        assert_eq!(limits.window, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_probe_uncapped_when_server_completes() {
        // Everything fits in one response and has_more = false.
        let prober = prober_over(TableTransport::new(700));
        let limits = prober.probe("stock_basic").await.unwrap();
        assert_eq!(limits.rows_per_call, 0);
        assert!(limits.is_row_uncapped());
    }

    #[tokio::test]
    async fn test_probe_heuristic_without_has_more() {
        // No has_more flag: a round multiple of 1000 reads as a cap.
        let prober = prober_over(TableTransport::new(9_999).with_cap(3000).without_has_more());
        let limits = prober.probe("daily").await.unwrap();
        assert_eq!(limits.rows_per_call, 3000);

        // A ragged count reads as the complete dataset.
        let prober = prober_over(TableTransport::new(700).without_has_more());
        let limits = prober.probe("stock_basic").await.unwrap();
        assert_eq!(limits.rows_per_call, 0);
    }

    #[tokio::test]
    async fn test_probe_uses_declared_rate() {
        let transport = TableTransport::new(100);
        let mut config = ClientConfig::default();
        config.declared_rates.insert("daily".into(), 500);
        let prober = LimitProber::new(Arc::new(transport), &config);

        let limits = prober.probe("daily").await.unwrap();
        assert_eq!(limits.calls_per_window, 500);
    }

    #[tokio::test]
    async fn test_probe_throttled_falls_back_to_defaults() {
        let transport = TableTransport::new(100);
        transport.fail_at(0, &[FailKind::Throttled]);
        let prober = prober_over(transport);

        let limits = prober.probe("daily").await.unwrap();
        assert_eq!(limits.rows_per_call, 5000);
        assert_eq!(limits.calls_per_window, 60);
    }

    #[tokio::test]
    async fn test_probe_retries_transient_then_succeeds() {
        let transport = TableTransport::new(100);
        transport.fail_at(0, &[FailKind::Transient, FailKind::Transient]);
        let prober = prober_over(transport);

        let limits = prober.probe("daily").await.unwrap();
        assert_eq!(limits.rows_per_call, 0);
    }

    #[tokio::test]
    async fn test_probe_exhausts_retries() {
        let transport = TableTransport::new(100);
        transport.fail_at(
            0,
            &[FailKind::Transient, FailKind::Transient, FailKind::Transient],
        );
        let prober = prober_over(transport);

        let err = prober.probe("daily").await.unwrap_err();
        assert!(matches!(err, Error::Probe { .. }));
    }

    #[tokio::test]
    async fn test_probe_fatal_is_probe_error() {
        let transport = TableTransport::new(100);
        transport.fail_at(0, &[FailKind::Fatal]);
        let prober = prober_over(transport);

        let err = prober.probe("bogus_api").await.unwrap_err();
        assert!(matches!(err, Error::Probe { .. }));
    }
}
