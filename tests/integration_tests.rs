//! Integration tests using a mock HTTP server
//!
//! Exercise the full pipeline end-to-end: probe → plan → rate-gated
//! execution → assembly, over `HttpTransport` against a wiremock server
//! speaking the JSON-POST envelope protocol.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tabfetch::{
    DataClient, EndpointLimits, ErrorClass, FetchOptions, FetchRequest, HttpTransport,
};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Serves a synthetic numbered table through the envelope protocol,
/// honoring `params.offset` / `params.limit` and capping page size the way
/// a real backend does.
struct TableResponder {
    total: u64,
    cap: u64,
    calls: Arc<AtomicUsize>,
    probe_calls: Arc<AtomicUsize>,
}

impl TableResponder {
    fn new(total: u64, cap: u64) -> Self {
        Self {
            total,
            cap,
            calls: Arc::new(AtomicUsize::new(0)),
            probe_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    fn probe_calls(&self) -> Arc<AtomicUsize> {
        self.probe_calls.clone()
    }

    fn page_body(&self, offset: u64, limit: Option<u64>) -> Value {
        let page = limit.unwrap_or(self.cap).min(self.cap);
        let start = offset.min(self.total);
        let end = start.saturating_add(page).min(self.total);
        let items: Vec<Value> = (start..end)
            .map(|i| json!([i, format!("row-{i}")]))
            .collect();
        json!({
            "code": 0,
            "msg": "",
            "data": {
                "fields": ["id", "name"],
                "items": items,
                "has_more": end < self.total,
            }
        })
    }
}

impl Respond for TableResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let offset = body["params"]["offset"].as_u64().unwrap_or(0);
        let limit = body["params"]["limit"].as_u64();
        if limit.is_none() {
            self.probe_calls.fetch_add(1, Ordering::SeqCst);
        }
        ResponseTemplate::new(200).set_body_json(self.page_body(offset, limit))
    }
}

/// Fails the first `failures` calls with the given envelope code, then
/// delegates to a [`TableResponder`].
struct FlakyResponder {
    remaining: AtomicUsize,
    code: i64,
    msg: &'static str,
    inner: TableResponder,
}

impl Respond for FlakyResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return ResponseTemplate::new(200)
                .set_body_json(json!({"code": self.code, "msg": self.msg}));
        }
        self.inner.respond(request)
    }
}

async fn serve(responder: impl Respond + 'static) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(responder)
        .mount(&server)
        .await;
    server
}

fn client_for(server: &MockServer) -> DataClient {
    let transport = HttpTransport::builder(server.uri()).build().unwrap();
    DataClient::builder(transport)
        .enable_rate_limit(false)
        .max_retries(3)
        .retry_delay(Duration::from_millis(5))
        .build()
}

fn expected_rows(n: u64) -> Vec<Vec<Value>> {
    (0..n).map(|i| vec![json!(i), json!(format!("row-{i}"))]).collect()
}

#[tokio::test]
async fn test_bounded_fetch_end_to_end() {
    let responder = TableResponder::new(50_000, 5000);
    let calls = responder.calls();
    let server = serve(responder).await;
    let client = client_for(&server);

    let table = client
        .fetch(
            FetchRequest::new("daily")
                .fields(["id", "name"])
                .row_limit(12_000),
            FetchOptions::sequential(),
        )
        .await
        .unwrap();

    assert_eq!(table.len(), 12_000);
    assert_eq!(table.columns, vec!["id", "name"]);
    assert_eq!(table.rows, expected_rows(12_000));
    // One probe plus three planned pages.
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_open_ended_fetch_stops_at_short_page() {
    let responder = TableResponder::new(8000, 5000);
    let server = serve(responder).await;
    let client = client_for(&server);

    let table = client
        .fetch(FetchRequest::new("daily"), FetchOptions::sequential())
        .await
        .unwrap();

    // All available rows exactly once, ending at the 3000-row short page.
    assert_eq!(table.len(), 8000);
    assert_eq!(table.rows, expected_rows(8000));
}

#[tokio::test]
async fn test_sequential_and_concurrent_agree() {
    let responder = TableResponder::new(23_456, 1000);
    let server = serve(responder).await;
    let client = client_for(&server);

    let request = FetchRequest::new("daily").row_limit(10_500);
    let sequential = client
        .fetch(request.clone(), FetchOptions::sequential())
        .await
        .unwrap();
    let concurrent = client
        .fetch(request, FetchOptions::concurrent().with_max_workers(4))
        .await
        .unwrap();

    assert_eq!(sequential, concurrent);
    assert_eq!(sequential.len(), 10_500);
}

#[tokio::test]
async fn test_open_ended_concurrent_agrees_with_sequential() {
    let responder = TableResponder::new(7321, 1000);
    let server = serve(responder).await;
    let client = client_for(&server);

    let sequential = client
        .fetch(FetchRequest::new("daily"), FetchOptions::sequential())
        .await
        .unwrap();
    let concurrent = client
        .fetch(
            FetchRequest::new("daily"),
            FetchOptions::concurrent().with_max_workers(3),
        )
        .await
        .unwrap();

    assert_eq!(sequential, concurrent);
    assert_eq!(sequential.len(), 7321);
}

#[tokio::test]
async fn test_uncapped_endpoint_fetched_in_one_call() {
    // The whole dataset fits one response: probe reports no cap, fetch
    // needs a single call.
    let responder = TableResponder::new(700, 100_000);
    let calls = responder.calls();
    let server = serve(responder).await;
    let client = client_for(&server);

    let table = client
        .fetch(FetchRequest::new("stock_basic"), FetchOptions::sequential())
        .await
        .unwrap();

    assert_eq!(table.len(), 700);
    // Probe plus one unbounded call.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_concurrent_first_fetches_probe_once() {
    let responder = TableResponder::new(5000, 1000);
    let probe_calls = responder.probe_calls();
    let server = serve(responder).await;
    let client = Arc::new(client_for(&server));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .fetch(
                    FetchRequest::new("daily").row_limit(2000),
                    FetchOptions::sequential(),
                )
                .await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().len(), 2000);
    }

    assert_eq!(probe_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_transient_failures_recovered() {
    let responder = FlakyResponder {
        remaining: AtomicUsize::new(2),
        code: 500,
        msg: "internal error",
        inner: TableResponder::new(3000, 1000),
    };
    let server = serve(responder).await;
    let client = client_for(&server);
    client.registry().insert(EndpointLimits::new(
        "daily",
        1000,
        0,
        Duration::from_secs(60),
    ));

    let table = client
        .fetch(
            FetchRequest::new("daily").row_limit(3000),
            FetchOptions::sequential(),
        )
        .await
        .unwrap();

    assert_eq!(table.len(), 3000);
}

#[tokio::test]
async fn test_retries_exhausted_surfaces_context() {
    let responder = FlakyResponder {
        remaining: AtomicUsize::new(usize::MAX),
        code: 500,
        msg: "internal error",
        inner: TableResponder::new(3000, 1000),
    };
    let server = serve(responder).await;
    let client = client_for(&server);
    client.registry().insert(EndpointLimits::new(
        "daily",
        1000,
        0,
        Duration::from_secs(60),
    ));

    let err = client
        .fetch(
            FetchRequest::new("daily").row_limit(1000),
            FetchOptions::sequential(),
        )
        .await
        .unwrap_err();

    match err {
        tabfetch::Error::RetriesExhausted {
            endpoint, attempts, ..
        } => {
            assert_eq!(endpoint, "daily");
            assert_eq!(attempts, 4);
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fatal_error_aborts_without_retry() {
    let responder = FlakyResponder {
        remaining: AtomicUsize::new(usize::MAX),
        code: 2002,
        msg: "token invalid",
        inner: TableResponder::new(3000, 1000),
    };
    let calls = responder.inner.calls();
    let server = serve(responder).await;
    let client = client_for(&server);
    client.registry().insert(EndpointLimits::new(
        "daily",
        1000,
        0,
        Duration::from_secs(60),
    ));

    let err = client
        .fetch(
            FetchRequest::new("daily").row_limit(5000),
            FetchOptions::concurrent().with_max_workers(3),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, tabfetch::Error::Request { code: 2002, .. }));
    // The flaky layer swallowed every call; the table itself saw none.
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_throttle_envelope_retried_and_recovered() {
    let responder = FlakyResponder {
        remaining: AtomicUsize::new(1),
        code: 40203,
        msg: "每分钟最多访问该接口500次",
        inner: TableResponder::new(2000, 1000),
    };
    let server = serve(responder).await;
    // Rate limiting on, with a cap generous enough not to slow the test.
    // Limits are declared upfront so the throttle hits the data fetch, not
    // the probe.
    let transport = HttpTransport::builder(server.uri()).build().unwrap();
    let client = DataClient::builder(transport)
        .max_retries(3)
        .retry_delay(Duration::from_millis(5))
        .build();
    client.registry().insert(EndpointLimits::new(
        "daily",
        1000,
        10_000,
        Duration::from_secs(60),
    ));

    let table = client
        .fetch(FetchRequest::new("daily"), FetchOptions::sequential())
        .await
        .unwrap();

    assert_eq!(table.len(), 2000);
}

#[tokio::test]
async fn test_custom_classifier_reroutes_unknown_code() {
    // This server reports throttling as code 7, which the default
    // classifier would treat as fatal.
    let responder = FlakyResponder {
        remaining: AtomicUsize::new(1),
        code: 7,
        msg: "busy",
        inner: TableResponder::new(2000, 1000),
    };
    let server = serve(responder).await;

    let transport = HttpTransport::builder(server.uri())
        .classifier(Arc::new(|code, _msg| {
            if code == 7 {
                ErrorClass::Throttling
            } else {
                ErrorClass::Fatal
            }
        }))
        .build()
        .unwrap();
    let client = DataClient::builder(transport)
        .enable_rate_limit(false)
        .max_retries(2)
        .retry_delay(Duration::from_millis(5))
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

    assert_eq!(table.len(), 2000);
}

#[tokio::test]
async fn test_fetch_single_passthrough() {
    let responder = TableResponder::new(50_000, 100_000);
    let calls = responder.calls();
    let server = serve(responder).await;
    let client = client_for(&server);

    let table = client
        .fetch_single(FetchRequest::new("daily").row_limit(250))
        .await
        .unwrap();

    assert_eq!(table.len(), 250);
    // No probe, no pagination: exactly one call.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_yaml_config_drives_client() {
    let responder = TableResponder::new(2500, 1000);
    let server = serve(responder).await;

    let config = tabfetch::ClientConfig::from_yaml_str(
        r"
max_workers: 2
max_retries: 1
retry_delay_ms: 5
enable_rate_limit: false
",
    )
    .unwrap();

    let transport = HttpTransport::builder(server.uri()).build().unwrap();
    let client = DataClient::builder(transport).config(config).build();

    let table = client
        .fetch(FetchRequest::new("daily"), FetchOptions::concurrent())
        .await
        .unwrap();

    assert_eq!(table.len(), 2500);
    assert_eq!(client.config().max_workers, 2);
}
