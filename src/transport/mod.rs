//! Transport layer
//!
//! The fetch core depends only on the [`Transport`] trait: one call fetches
//! one bounded slice of one endpoint's data. [`HttpTransport`] is the
//! shipped implementation speaking the JSON-POST envelope protocol of the
//! target API; tests and embedders can substitute anything else.

mod classify;
mod http;

pub use classify::{default_classifier, ErrorClass, ErrorClassifier};
pub use http::{HttpTransport, HttpTransportBuilder};

use crate::error::Result;
use crate::types::{FilterMap, Row};
use async_trait::async_trait;

/// One page of raw tabular data as returned by the remote API
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    /// Column names, in payload order
    pub columns: Vec<String>,

    /// Row data, in payload order
    pub rows: Vec<Row>,

    /// The server's continuation flag, when the protocol carries one
    pub has_more: Option<bool>,
}

/// A single bounded call against a remote tabular endpoint.
///
/// `offset` is the first row wanted; `limit` is the page size, or `None` to
/// let the server pick (used by the limit prober and for uncapped
/// endpoints). Implementations map server failures onto the error taxonomy:
/// throttling signals to [`crate::Error::Throttled`], network-level trouble
/// to [`crate::Error::Transport`], everything fatal to
/// [`crate::Error::Request`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch one page
    async fn call(
        &self,
        endpoint: &str,
        fields: &[String],
        filters: &FilterMap,
        offset: u64,
        limit: Option<u32>,
    ) -> Result<RawPage>;
}

#[async_trait]
impl<T> Transport for std::sync::Arc<T>
where
    T: Transport + ?Sized,
{
    async fn call(
        &self,
        endpoint: &str,
        fields: &[String],
        filters: &FilterMap,
        offset: u64,
        limit: Option<u32>,
    ) -> Result<RawPage> {
        (**self).call(endpoint, fields, filters, offset, limit).await
    }
}
