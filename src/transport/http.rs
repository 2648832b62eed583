//! HTTP transport for the JSON-POST envelope protocol
//!
//! Every call is a POST of `{api_name, token, params, fields}` to a single
//! base URL; the server answers `{code, msg, data: {fields, items,
//! has_more}}`. Offset and limit travel inside `params` next to the caller's
//! filters.

use super::classify::{default_classifier, ErrorClass, ErrorClassifier};
use super::{RawPage, Transport};
use crate::error::{Error, Result};
use crate::types::{FilterMap, Row};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Reqwest-backed [`Transport`] implementation
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    token: Option<String>,
    classifier: ErrorClassifier,
}

/// Builder for [`HttpTransport`]
pub struct HttpTransportBuilder {
    base_url: String,
    token: Option<String>,
    timeout: Duration,
    user_agent: String,
    classifier: Option<ErrorClassifier>,
}

impl HttpTransportBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: Duration::from_secs(30),
            user_agent: format!("tabfetch/{}", env!("CARGO_PKG_VERSION")),
            classifier: None,
        }
    }

    /// Set the API token carried in every request envelope
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the request timeout (default 30s)
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Replace the server-error classifier
    #[must_use]
    pub fn classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Build the transport, validating the base URL
    pub fn build(self) -> Result<HttpTransport> {
        let base_url = Url::parse(&self.base_url)?;
        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
            .expect("Failed to build HTTP client");

        Ok(HttpTransport {
            client,
            base_url,
            token: self.token,
            classifier: self.classifier.unwrap_or_else(default_classifier),
        })
    }
}

/// Request envelope
#[derive(Serialize)]
struct ApiRequest<'a> {
    api_name: &'a str,
    token: &'a str,
    params: &'a FilterMap,
    fields: String,
}

/// Response envelope
#[derive(Deserialize)]
struct ApiEnvelope {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<ApiData>,
}

#[derive(Deserialize)]
struct ApiData {
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    items: Vec<Row>,
    #[serde(default)]
    has_more: Option<bool>,
}

impl HttpTransport {
    /// Create a builder for the given base URL
    pub fn builder(base_url: impl Into<String>) -> HttpTransportBuilder {
        HttpTransportBuilder::new(base_url)
    }

    fn classify_server_error(&self, endpoint: &str, code: i64, message: String) -> Error {
        match (self.classifier)(code, &message) {
            ErrorClass::Throttling => Error::throttled(endpoint, code, message),
            ErrorClass::Transient => {
                Error::transport(endpoint, format!("server error {code}: {message}"))
            }
            ErrorClass::Fatal => Error::request(endpoint, code, message),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        endpoint: &str,
        fields: &[String],
        filters: &FilterMap,
        offset: u64,
        limit: Option<u32>,
    ) -> Result<RawPage> {
        let mut params = filters.clone();
        params.insert("offset".to_string(), offset.into());
        if let Some(limit) = limit {
            params.insert("limit".to_string(), limit.into());
        }

        let payload = ApiRequest {
            api_name: endpoint,
            token: self.token.as_deref().unwrap_or(""),
            params: &params,
            fields: fields.join(","),
        };

        let response = self
            .client
            .post(self.base_url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::transport(endpoint, "request timeout")
                } else if e.is_connect() {
                    Error::transport(endpoint, format!("connection failed: {e}"))
                } else {
                    Error::transport(endpoint, e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::throttled(endpoint, i64::from(status.as_u16()), body));
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::transport(
                endpoint,
                format!("HTTP {}: {body}", status.as_u16()),
            ));
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::request(endpoint, i64::from(status.as_u16()), body));
        }

        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|e| Error::transport(endpoint, format!("invalid response body: {e}")))?;

        if envelope.code != 0 {
            let message = envelope.msg.unwrap_or_default();
            return Err(self.classify_server_error(endpoint, envelope.code, message));
        }

        let data = envelope
            .data
            .ok_or_else(|| Error::transport(endpoint, "response envelope missing data"))?;

        debug!(
            endpoint,
            offset,
            rows = data.items.len(),
            has_more = ?data.has_more,
            "fetched page"
        );

        Ok(RawPage {
            columns: data.fields,
            rows: data.items,
            has_more: data.has_more,
        })
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("has_token", &self.token.is_some())
            .finish_non_exhaustive()
    }
}
