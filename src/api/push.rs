//! Push query streaming endpoints
//!
//! A push query is a long-lived chunked response: one metadata line carrying
//! the query id, then one serialized row per line as the pipeline produces
//! them. The stream ends when the query is terminated, the pipeline shuts
//! down, or the subscriber overruns its buffer; in the overrun case the last
//! line is a structured error. Client disconnect and the explicit terminate
//! call converge on the same teardown path.

use super::{telemetry, ApiState};
use crate::push::{
    CloseReason, ConnectionId, ProcessingQueue, PushQueryHandle, PushQueryId,
    QueryLifecycleManager,
};
use crate::Error;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Push query request
#[derive(Debug, Default, Deserialize)]
pub struct PushQueryRequest {
    /// Source classification supplied by the planner, for metrics
    #[serde(default)]
    pub source_type: Option<String>,
    /// Plan classification supplied by the planner, for metrics
    #[serde(default)]
    pub plan_type: Option<String>,
}

/// Explicit server-side termination of a push query
#[derive(Debug, Serialize, Deserialize)]
pub struct TerminateRequest {
    pub query_id: PushQueryId,
}

/// Termination outcome
#[derive(Debug, Serialize, Deserialize)]
pub struct TerminateResponse {
    pub was_terminated: bool,
}

/// Tears the query down when the response stream is dropped, whichever of
/// client disconnect, terminate call, or shutdown got there first.
struct StreamGuard {
    lifecycle: Arc<QueryLifecycleManager>,
    connection: ConnectionId,
    queue: Arc<ProcessingQueue>,
    query_id: PushQueryId,
    source_type: String,
    plan_type: String,
    started: Instant,
    rows_returned: u64,
    bytes_returned: u64,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        // Read the reason before teardown closes the queue as finished.
        let outcome = match self.queue.close_reason() {
            Some(CloseReason::Overrun) => "overrun",
            Some(CloseReason::Shutdown) => "shutdown",
            Some(CloseReason::Finished) => "finished",
            None => "disconnected",
        };
        self.lifecycle.remove_for_connection(&self.connection);
        telemetry::record_query(telemetry::QueryMetrics {
            kind: "push",
            source_type: self.source_type.clone(),
            plan_type: self.plan_type.clone(),
            outcome,
            duration_seconds: self.started.elapsed().as_secs_f64(),
            rows_returned: self.rows_returned,
            rows_processed: self.rows_returned,
            bytes_returned: self.bytes_returned,
        });
        debug!("Push query {} torn down ({})", self.query_id, outcome);
    }
}

struct StreamState {
    guard: StreamGuard,
    header_sent: bool,
    finished: bool,
}

/// Open a push query: admit against the quota, register the subscriber
/// queue, and stream rows until teardown.
pub async fn open_push_query(
    State(state): State<ApiState>,
    Json(request): Json<PushQueryRequest>,
) -> Response {
    let queue = Arc::new(ProcessingQueue::new(state.push_config.queue_capacity));
    let connection = ConnectionId::random();
    let query_id = PushQueryId::random();

    let handle = PushQueryHandle {
        id: query_id,
        connection,
        queue: Arc::clone(&queue),
    };
    if let Err(e) = state.lifecycle.register_query(handle) {
        let status = match &e {
            Error::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        return (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response();
    }
    debug!("Opened push query {} on connection {}", query_id, connection);

    let guard = StreamGuard {
        lifecycle: Arc::clone(&state.lifecycle),
        connection,
        queue,
        query_id,
        source_type: request.source_type.unwrap_or_else(|| "unknown".to_string()),
        plan_type: request.plan_type.unwrap_or_else(|| "unknown".to_string()),
        started: Instant::now(),
        rows_returned: 0,
        bytes_returned: 0,
    };
    let state0 = StreamState {
        guard,
        header_sent: false,
        finished: false,
    };

    let stream = futures::stream::unfold(state0, |mut s| async move {
        if !s.header_sent {
            s.header_sent = true;
            let line = format!("{}\n", serde_json::json!({ "query_id": s.guard.query_id }));
            s.guard.bytes_returned += line.len() as u64;
            return Some((Ok::<Bytes, Infallible>(Bytes::from(line)), s));
        }
        if s.finished {
            return None;
        }
        match s.guard.queue.recv().await {
            Some(row) => match serde_json::to_string(row.as_ref()) {
                Ok(mut line) => {
                    line.push('\n');
                    s.guard.rows_returned += 1;
                    s.guard.bytes_returned += line.len() as u64;
                    Some((Ok(Bytes::from(line)), s))
                }
                Err(e) => {
                    s.finished = true;
                    let line = format!(
                        "{}\n",
                        serde_json::json!({ "error": format!("row serialization failed: {}", e) })
                    );
                    Some((Ok(Bytes::from(line)), s))
                }
            },
            None => {
                s.finished = true;
                match s.guard.queue.close_reason() {
                    Some(CloseReason::Overrun) => {
                        let err = Error::BufferOverrun {
                            query_id: s.guard.query_id.to_string(),
                        };
                        let line =
                            format!("{}\n", serde_json::json!({ "error": err.to_string() }));
                        s.guard.bytes_returned += line.len() as u64;
                        Some((Ok(Bytes::from(line)), s))
                    }
                    _ => None,
                }
            }
        }
    });

    match Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header("x-query-id", query_id.to_string())
        .body(Body::from_stream(stream))
    {
        Ok(response) => response,
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// Terminate a push query server-side; its stream ends with end-of-stream.
pub async fn terminate_push_query(
    State(state): State<ApiState>,
    Json(request): Json<TerminateRequest>,
) -> Json<TerminateResponse> {
    let was_terminated = state.lifecycle.remove_query(&request.query_id).is_some();
    Json(TerminateResponse { was_terminated })
}
