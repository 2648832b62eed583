//! Error types for tabfetch
//!
//! This module defines the error hierarchy for the whole crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use thiserror::Error;

/// The main error type for tabfetch
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Fetch Errors
    // ============================================================================
    /// Network-level failure (timeout, reset, refused connection). Retryable.
    #[error("transport error for '{endpoint}': {message}")]
    Transport { endpoint: String, message: String },

    /// The server signaled a rate-limit violation. Retryable; additionally
    /// feeds the limiter's adaptive cooldown.
    #[error("server throttled '{endpoint}' (code {code}): {message}")]
    Throttled {
        endpoint: String,
        code: i64,
        message: String,
    },

    /// The server rejected the request itself (bad filters or fields, auth
    /// failure, unknown endpoint). Never retried.
    #[error("request rejected for '{endpoint}' (code {code}): {message}")]
    Request {
        endpoint: String,
        code: i64,
        message: String,
    },

    /// Limit discovery failed after its own retries. Callers can fall back
    /// to supplying limits manually via `LimitRegistry::insert`.
    #[error("limit probe failed for '{endpoint}': {message}")]
    Probe { endpoint: String, message: String },

    /// A single page ran out of retries; aborts the whole multi-page fetch.
    #[error("page at offset {offset} of '{endpoint}' failed after {attempts} attempts: {last_cause}")]
    RetriesExhausted {
        endpoint: String,
        offset: u64,
        attempts: u32,
        last_cause: String,
    },

    /// Gap, overlap or column mismatch in the merged pages. Indicates a
    /// planner or scheduler defect, never a transient network condition.
    #[error("assembly invariant violated: {message}")]
    Assembly { message: String },

    /// The fetch was cancelled before this page started.
    #[error("fetch cancelled")]
    Cancelled,

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    /// Invalid client configuration
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A YAML config file failed to parse
    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// A JSON payload failed to parse
    #[error("failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Ambient Errors
    // ============================================================================
    /// Errors bubbling out of reqwest directly
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A base URL failed to parse
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Cache or config file I/O failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for embedder-supplied transports
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a transport error
    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a throttling error
    pub fn throttled(endpoint: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self::Throttled {
            endpoint: endpoint.into(),
            code,
            message: message.into(),
        }
    }

    /// Create a fatal request error
    pub fn request(endpoint: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self::Request {
            endpoint: endpoint.into(),
            code,
            message: message.into(),
        }
    }

    /// Create a probe error
    pub fn probe(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Probe {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create an assembly error
    pub fn assembly(message: impl Into<String>) -> Self {
        Self::Assembly {
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this error may be recovered by retrying the call
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. } | Error::Throttled { .. } | Error::Http(_)
        )
    }

    /// Check if this error is a server throttling signal
    pub fn is_throttling(&self) -> bool {
        matches!(self, Error::Throttled { .. })
    }
}

/// Result type alias for tabfetch
pub type Result<T> = std::result::Result<T, Error>;
