//! Common types used throughout tabfetch
//!
//! Shared type definitions, type aliases and the caller-facing request and
//! option types used across multiple modules.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// One row of a tabular payload, in column order
pub type Row = Vec<JsonValue>;

/// Request filter map. Unknown keys are passed through verbatim to the
/// transport, so endpoint-specific parameters need no special handling here.
pub type FilterMap = HashMap<String, JsonValue>;

// ============================================================================
// Fetch Request
// ============================================================================

/// A logical dataset request: which endpoint, which columns, which filters,
/// and how many rows (`0` = all available).
///
/// Immutable once handed to [`crate::DataClient::fetch`]; built with the
/// chained setters below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Endpoint (remote query) name
    pub endpoint: String,

    /// Columns to request, in output order. Empty = server default set.
    #[serde(default)]
    pub fields: Vec<String>,

    /// Endpoint filters, passed through verbatim
    #[serde(default)]
    pub filters: FilterMap,

    /// Total rows wanted. `0` means all available rows.
    #[serde(default)]
    pub row_limit: u64,
}

impl FetchRequest {
    /// Create a request for the given endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Replace the requested field list
    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Append a single field
    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    /// Add a filter parameter
    #[must_use]
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Set the total row limit (`0` = all available)
    #[must_use]
    pub fn row_limit(mut self, limit: u64) -> Self {
        self.row_limit = limit;
        self
    }

    /// Whether this request is open-ended (fetch until end of data)
    pub fn is_open_ended(&self) -> bool {
        self.row_limit == 0
    }
}

// ============================================================================
// Fetch Options
// ============================================================================

/// Per-call execution options, overriding the client defaults where set.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Run pages through the bounded worker pool instead of sequentially
    pub concurrent: bool,

    /// Override the client's worker-pool size
    pub max_workers: Option<usize>,

    /// Override the client's retry budget per page
    pub max_retries: Option<u32>,

    /// Override the client's initial retry delay
    pub retry_delay: Option<Duration>,
}

impl FetchOptions {
    /// Sequential execution with client defaults
    pub fn sequential() -> Self {
        Self::default()
    }

    /// Concurrent execution with client defaults
    pub fn concurrent() -> Self {
        Self {
            concurrent: true,
            ..Self::default()
        }
    }

    /// Override the worker-pool size
    #[must_use]
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    /// Override the per-page retry budget
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Override the initial retry delay
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }
}

// ============================================================================
// Page Result
// ============================================================================

/// The outcome of one page fetch, tagged with enough position information
/// for the assembler to validate coverage.
#[derive(Debug, Clone)]
pub struct PageResult {
    /// Position of this page in the planned sequence
    pub seq: usize,

    /// Row offset this page was fetched at
    pub offset: u64,

    /// Rows requested for this page. `0` for an unbounded single call.
    pub requested: u32,

    /// Column names, in payload order
    pub columns: Vec<String>,

    /// Row data, in payload order
    pub rows: Vec<Row>,

    /// Server's explicit continuation flag, when the protocol carries one
    pub has_more: Option<bool>,
}

impl PageResult {
    /// A short page carries fewer rows than requested and signals end of
    /// data at higher offsets. Unbounded pages are never short.
    pub fn is_short(&self) -> bool {
        self.requested > 0 && (self.rows.len() as u32) < self.requested
    }

    /// Whether the server explicitly declared this the last page
    pub fn is_last(&self) -> bool {
        self.is_short() || self.has_more == Some(false)
    }
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Type of backoff between retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    #[default]
    Exponential,
}
