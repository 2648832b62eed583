//! # tabfetch
//!
//! A resilient fetch engine for rate-limited tabular data APIs.
//!
//! Remote tabular APIs impose two kinds of limits: a maximum number of rows
//! per call and a maximum call frequency. tabfetch sits between a caller
//! asking for one logical dataset and such an API, and handles everything in
//! between: discovering each endpoint's limits, planning the page sequence,
//! executing pages sequentially or through a bounded worker pool under a
//! shared rate budget, retrying transient failures with backoff, and merging
//! the pages into one deterministic table.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tabfetch::{DataClient, FetchOptions, FetchRequest, HttpTransport};
//!
//! #[tokio::main]
//! async fn main() -> tabfetch::Result<()> {
//!     let transport = HttpTransport::builder("http://api.example.com")
//!         .token(std::env::var("API_TOKEN").unwrap())
//!         .build()?;
//!     let client = DataClient::builder(transport).max_workers(8).build();
//!
//!     let table = client
//!         .fetch(
//!             FetchRequest::new("daily")
//!                 .fields(["ts_code", "trade_date", "close"])
//!                 .filter("trade_date", "20240105")
//!                 .row_limit(12_000),
//!             FetchOptions::concurrent(),
//!         )
//!         .await?;
//!
//!     println!("{} rows", table.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         DataClient                              │
//! │        fetch(request, options) → AssembledTable                 │
//! └───────┬───────────────┬───────────────┬─────────────┬───────────┘
//!         │               │               │             │
//! ┌───────┴─────┬─────────┴─────┬─────────┴───┬─────────┴───────────┐
//! │   Limits    │     Plan      │  Scheduler  │      Assemble       │
//! ├─────────────┼───────────────┼─────────────┼─────────────────────┤
//! │ Registry    │ PageDescriptor│ Sequential  │ Order by seq        │
//! │ Prober      │ Bounded plans │ Worker pool │ Gap/overlap checks  │
//! │ Single-     │ Look-ahead    │ Rate-gated  │ Short-page cutoff   │
//! │  flight     │  batches      │ Cancellable │ Overshoot trimming  │
//! └─────────────┴───────────────┴──────┬──────┴─────────────────────┘
//!                                      │
//!                      ┌───────────────┴──────────────┐
//!                      │   Retry · RateLimiter        │
//!                      │   Transport (HTTP or custom) │
//!                      └──────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Client configuration
pub mod config;

/// Transport trait, HTTP implementation and error classification
pub mod transport;

/// Endpoint limit discovery and caching
pub mod limits;

/// Adaptive endpoint-keyed rate limiting
pub mod rate;

/// Pagination planning
pub mod plan;

/// Retry and backoff around single page fetches
pub mod retry;

/// Sequential and concurrent page execution
pub mod scheduler;

/// Merging page results into the final table
pub mod assemble;

/// Caller-facing client
pub mod client;

#[cfg(test)]
pub(crate) mod testutil;

// ============================================================================
// Re-exports
// ============================================================================

pub use assemble::AssembledTable;
pub use client::{DataClient, DataClientBuilder};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use limits::{EndpointLimits, LimitProber, LimitRegistry};
pub use rate::RateLimiter;
pub use transport::{
    default_classifier, ErrorClass, ErrorClassifier, HttpTransport, RawPage, Transport,
};
pub use types::{BackoffType, FetchOptions, FetchRequest, FilterMap, PageResult, Row};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
