//! Shared test doubles
//!
//! A deterministic in-memory [`Transport`] serving a synthetic table, with
//! per-offset failure injection. Compiled only for tests.

use crate::error::{Error, Result};
use crate::transport::{RawPage, Transport};
use crate::types::{FilterMap, Row};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Failure to inject at a given offset, consumed one per call
#[derive(Debug, Clone, Copy)]
pub(crate) enum FailKind {
    Transient,
    Throttled,
    Fatal,
}

impl FailKind {
    fn to_error(self, endpoint: &str) -> Error {
        match self {
            Self::Transient => Error::transport(endpoint, "injected transient failure"),
            Self::Throttled => Error::throttled(endpoint, 40203, "injected throttle"),
            Self::Fatal => Error::request(endpoint, 2002, "injected fatal failure"),
        }
    }
}

/// In-memory transport serving rows `0..total_rows` of a two-column table
pub(crate) struct TableTransport {
    columns: Vec<String>,
    total_rows: u64,
    server_cap: Option<u32>,
    emit_has_more: bool,
    calls: AtomicUsize,
    fail_plan: Mutex<HashMap<u64, VecDeque<FailKind>>>,
}

impl TableTransport {
    pub fn new(total_rows: u64) -> Self {
        Self {
            columns: vec!["id".to_string(), "name".to_string()],
            total_rows,
            server_cap: None,
            emit_has_more: true,
            calls: AtomicUsize::new(0),
            fail_plan: Mutex::new(HashMap::new()),
        }
    }

    /// Cap the number of rows the server returns per call, regardless of
    /// the requested limit
    pub fn with_cap(mut self, cap: u32) -> Self {
        self.server_cap = Some(cap);
        self
    }

    /// Drop the `has_more` flag from responses (older protocol versions)
    pub fn without_has_more(mut self) -> Self {
        self.emit_has_more = false;
        self
    }

    /// Inject failures for calls at `offset`, consumed in order before any
    /// data is served from that offset
    pub fn fail_at(&self, offset: u64, kinds: &[FailKind]) {
        self.fail_plan
            .lock()
            .unwrap()
            .entry(offset)
            .or_default()
            .extend(kinds.iter().copied());
    }

    /// Total transport calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The deterministic row at index `i`
    pub fn row(i: u64) -> Row {
        vec![json!(i), json!(format!("row-{i}"))]
    }
}

#[async_trait]
impl Transport for TableTransport {
    async fn call(
        &self,
        endpoint: &str,
        _fields: &[String],
        _filters: &FilterMap,
        offset: u64,
        limit: Option<u32>,
    ) -> Result<RawPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(kind) = self
            .fail_plan
            .lock()
            .unwrap()
            .get_mut(&offset)
            .and_then(VecDeque::pop_front)
        {
            return Err(kind.to_error(endpoint));
        }

        let cap = match (limit, self.server_cap) {
            (Some(l), Some(c)) => u64::from(l.min(c)),
            (Some(l), None) => u64::from(l),
            (None, Some(c)) => u64::from(c),
            (None, None) => u64::MAX,
        };

        let start = offset.min(self.total_rows);
        let end = offset.saturating_add(cap).min(self.total_rows);
        let rows: Vec<Row> = (start..end).map(Self::row).collect();
        let has_more = self.emit_has_more.then(|| end < self.total_rows);

        Ok(RawPage {
            columns: self.columns.clone(),
            rows,
            has_more,
        })
    }
}
