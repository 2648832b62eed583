//! Endpoint limit facts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-endpoint limit facts, established once by probing (or declared by the
/// caller) and immutable until an explicit registry reset.
///
/// `0` encodes "no cap", matching the remote protocol's own convention:
/// `rows_per_call == 0` means the endpoint returns everything in one call,
/// `calls_per_window == 0` means it is not frequency limited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointLimits {
    /// Endpoint name
    pub endpoint: String,

    /// Maximum rows one call returns (`0` = uncapped)
    pub rows_per_call: u32,

    /// Maximum calls per window (`0` = not frequency limited)
    pub calls_per_window: u32,

    /// Length of the frequency window
    pub window: Duration,

    /// When these facts were established
    pub probed_at: DateTime<Utc>,
}

impl EndpointLimits {
    /// Create limit facts timestamped now
    pub fn new(
        endpoint: impl Into<String>,
        rows_per_call: u32,
        calls_per_window: u32,
        window: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            rows_per_call,
            calls_per_window,
            window,
            probed_at: Utc::now(),
        }
    }

    /// Whether the endpoint has no per-call row cap
    pub fn is_row_uncapped(&self) -> bool {
        self.rows_per_call == 0
    }

    /// Whether the endpoint has no frequency cap
    pub fn is_rate_unlimited(&self) -> bool {
        self.calls_per_window == 0
    }
}
