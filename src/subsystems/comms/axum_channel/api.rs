//! Axum handlers for the HTTP routes.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, warn};

use crate::gateway::ProxyEvent;
use crate::relay::PushError;

use super::AxumState;

/// Build a JSON error response body.
fn json_error(code: &str, msg: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({ "error": code, "message": format!("{msg}") }))
}

/// GET /api/health
pub(super) async fn health(State(state): State<AxumState>) -> Response {
    let body = json!({
        "status": "ok",
        "connections": state.comms.registry().len(),
    });
    (StatusCode::OK, Json(body)).into_response()
}

/// POST /api/events: one gateway proxy event.
///
/// The HTTP status mirrors the envelope's `status_code`.
pub(super) async fn events(
    State(state): State<AxumState>,
    Json(event): Json<ProxyEvent>,
) -> Response {
    let route_key = event.request_context.route_key.clone();
    let reply = state.comms.handle_event(&event).await;

    if !reply.is_ok() {
        warn!(
            channel_id = %state.channel_id,
            %route_key,
            status = reply.status_code,
            body = %reply.body,
            "event handling failed"
        );
    }

    let status = StatusCode::from_u16(reply.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply)).into_response()
}

/// POST /api/connections/{connection_id}: push raw bytes to a local socket.
pub(super) async fn push(
    State(state): State<AxumState>,
    Path(connection_id): Path<String>,
    body: Bytes,
) -> Response {
    match state.comms.push_to_connection(&connection_id, &body).await {
        Ok(()) => {
            debug!(channel_id = %state.channel_id, %connection_id, bytes = body.len(), "pushed");
            StatusCode::OK.into_response()
        }
        Err(e @ PushError::Gone(_)) => (StatusCode::GONE, json_error("gone", e)).into_response(),
        Err(e) => {
            warn!(channel_id = %state.channel_id, %connection_id, "push failed: {e}");
            (StatusCode::BAD_GATEWAY, json_error("internal", e)).into_response()
        }
    }
}
