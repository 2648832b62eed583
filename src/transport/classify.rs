//! Server error classification
//!
//! The remote API reports failures as `{code, msg}` pairs, and real
//! deployments have observed codes that disagree with the documented table.
//! The boundary between "throttled", "transient" and "fatal" is therefore an
//! injectable function rather than a hardcoded match.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// How a server-reported error should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rate-limit violation: retryable, and tightens the rate limiter
    Throttling,
    /// Temporary server trouble: retryable
    Transient,
    /// Broken request, bad auth, unknown endpoint: never retried
    Fatal,
}

/// Classifier deciding how a server `{code, msg}` pair maps onto the error
/// taxonomy. Injected per deployment; see [`default_classifier`].
pub type ErrorClassifier = Arc<dyn Fn(i64, &str) -> ErrorClass + Send + Sync>;

static THROTTLE_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)rate ?limit|too many requests|每分钟最多访问|访问频率").unwrap()
});

/// The stock classifier, modeled on the target API's observed behavior:
/// code 40203 or a throttle phrase in the message means throttling, code -1
/// and 5xx-style codes are transient server trouble, and any other non-zero
/// code is a broken request.
pub fn default_classifier() -> ErrorClassifier {
    Arc::new(classify)
}

fn classify(code: i64, message: &str) -> ErrorClass {
    if code == 40203 || THROTTLE_PHRASE.is_match(message) {
        ErrorClass::Throttling
    } else if code == -1 || (500..600).contains(&code) {
        ErrorClass::Transient
    } else {
        ErrorClass::Fatal
    }
}
