//! API-level telemetry for the HTTP surface and query execution.

use axum::extract::MatchedPath;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::Response;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::KeyValue;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{info_span, Instrument};

struct HttpInstruments {
    request_count: Counter<u64>,
    request_duration_seconds: Histogram<f64>,
    request_errors: Counter<u64>,
    request_size_bytes: Histogram<u64>,
    response_size_bytes: Histogram<u64>,
}

struct QueryInstruments {
    query_requests: Counter<u64>,
    query_duration_seconds: Histogram<f64>,
    query_rows_returned: Histogram<u64>,
    query_rows_processed: Histogram<u64>,
    query_bytes_returned: Histogram<u64>,
}

fn http_instruments() -> &'static HttpInstruments {
    static INSTRUMENTS: OnceLock<HttpInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("rowgate.api.http");
        HttpInstruments {
            request_count: meter
                .u64_counter("http.server.request.count")
                .with_description("Total number of HTTP requests handled by the rowgate API")
                .init(),
            request_duration_seconds: meter
                .f64_histogram("http.server.request.duration")
                .with_description("HTTP request duration")
                .with_unit("s")
                .init(),
            request_errors: meter
                .u64_counter("http.server.request.errors")
                .with_description("HTTP requests with 4xx/5xx status codes")
                .init(),
            request_size_bytes: meter
                .u64_histogram("http.server.request.size")
                .with_description("HTTP request body size, when declared")
                .with_unit("By")
                .init(),
            response_size_bytes: meter
                .u64_histogram("http.server.response.size")
                .with_description("HTTP response body size, when declared")
                .with_unit("By")
                .init(),
        }
    })
}

fn query_instruments() -> &'static QueryInstruments {
    static INSTRUMENTS: OnceLock<QueryInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("rowgate.query");
        QueryInstruments {
            query_requests: meter
                .u64_counter("rowgate.query.requests")
                .with_description("Query executions by kind and outcome")
                .init(),
            query_duration_seconds: meter
                .f64_histogram("rowgate.query.duration")
                .with_description("Query end-to-end latency")
                .with_unit("s")
                .init(),
            query_rows_returned: meter
                .u64_histogram("rowgate.query.rows_returned")
                .with_description("Rows returned to the client per query")
                .init(),
            query_rows_processed: meter
                .u64_histogram("rowgate.query.rows_processed")
                .with_description("Rows examined while answering a query")
                .init(),
            query_bytes_returned: meter
                .u64_histogram("rowgate.query.bytes_returned")
                .with_description("Bytes written to the client per query")
                .with_unit("By")
                .init(),
        }
    })
}

fn status_bucket(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

fn http_attributes(method: &str, route: &str, status: u16) -> Vec<KeyValue> {
    vec![
        KeyValue::new("http.request.method", method.to_string()),
        KeyValue::new("http.route", route.to_string()),
        KeyValue::new("http.response.status_code", status as i64),
        KeyValue::new("http.response.status_bucket", status_bucket(status)),
    ]
}

fn content_length(headers: &axum::http::HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

/// HTTP middleware recording request count, duration, sizes, and
/// status-class errors.
pub async fn http_observability_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().as_str().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let request_size = content_length(req.headers());

    let span = info_span!(
        "http.request",
        otel.kind = "server",
        http.request.method = %method,
        http.route = %route
    );
    let response = next.run(req).instrument(span).await;
    let status = response.status().as_u16();
    let elapsed = start.elapsed().as_secs_f64();
    let attrs = http_attributes(&method, &route, status);
    let instruments = http_instruments();

    instruments.request_count.add(1, &attrs);
    instruments.request_duration_seconds.record(elapsed, &attrs);
    if let Some(size) = request_size {
        instruments.request_size_bytes.record(size, &attrs);
    }
    if let Some(size) = content_length(response.headers()) {
        instruments.response_size_bytes.record(size, &attrs);
    }
    if status >= 400 {
        instruments.request_errors.add(1, &attrs);
    }

    response
}

/// Per-query execution metrics, sliceable by (source type, plan type).
pub struct QueryMetrics {
    /// "pull" or "push"
    pub kind: &'static str,
    pub source_type: String,
    pub plan_type: String,
    pub outcome: &'static str,
    pub duration_seconds: f64,
    pub rows_returned: u64,
    pub rows_processed: u64,
    pub bytes_returned: u64,
}

/// Record one query execution. The push path records on stream teardown;
/// pull executors call this after answering from the selected replica.
pub fn record_query(metrics: QueryMetrics) {
    let i = query_instruments();
    let attrs = vec![
        KeyValue::new("query.kind", metrics.kind),
        KeyValue::new("source.type", metrics.source_type),
        KeyValue::new("plan.type", metrics.plan_type),
        KeyValue::new("outcome", metrics.outcome),
    ];

    i.query_requests.add(1, &attrs);
    i.query_duration_seconds.record(metrics.duration_seconds, &attrs);
    i.query_rows_returned.record(metrics.rows_returned, &attrs);
    i.query_rows_processed.record(metrics.rows_processed, &attrs);
    i.query_bytes_returned.record(metrics.bytes_returned, &attrs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_buckets() {
        assert_eq!(status_bucket(200), "2xx");
        assert_eq!(status_bucket(204), "2xx");
        assert_eq!(status_bucket(404), "4xx");
        assert_eq!(status_bucket(500), "5xx");
    }
}
