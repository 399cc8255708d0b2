//! Pipeline control and status endpoints.
//!
//! Start/cancel/retry mutate through the orchestrator; status reads only
//! persisted state. The WebSocket route streams the per-meeting progress
//! topic to subscribers that pass the access gate.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::access;
use crate::api::error::{ApiError, ApiResult};
use crate::api::{caller_id, AppState};
use crate::db::{MeetingRecord, MeetingRepository};
use crate::pipeline::{processing_status, ProgressEvent};

/// Rough wall-clock estimate reported to the client when a run is accepted.
const ESTIMATED_TIME_MINUTES: u64 = 5;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/meetings/:id/process", post(start_processing))
        .route("/meetings/:id/process/cancel", post(cancel_processing))
        .route("/meetings/:id/process/retry", post(retry_processing))
        .route("/meetings/:id/processing-status", get(status))
        .route("/meetings/:id/events", get(events))
        .with_state(state)
}

async fn start_processing(
    Path(meeting_id): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let user_id = caller_id(&headers)?;
    info!("Processing requested for meeting {} by {}", meeting_id, user_id);

    // The handle is dropped; the spawned run reports through the topic.
    state.pipeline.start(&meeting_id, &user_id).await?;

    Ok(Json(json!({
        "success": true,
        "meetingId": meeting_id,
        "processingStarted": true,
        "estimatedTimeMinutes": ESTIMATED_TIME_MINUTES,
    })))
}

async fn cancel_processing(
    Path(meeting_id): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let user_id = caller_id(&headers)?;
    state.pipeline.cancel(&meeting_id, &user_id).await?;

    Ok(Json(json!({
        "success": true,
        "meetingId": meeting_id,
        "message": "Processing cancelled",
    })))
}

async fn retry_processing(
    Path(meeting_id): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let user_id = caller_id(&headers)?;
    state.pipeline.retry(&meeting_id, &user_id).await?;

    Ok(Json(json!({
        "success": true,
        "meetingId": meeting_id,
        "processingStarted": true,
        "estimatedTimeMinutes": ESTIMATED_TIME_MINUTES,
    })))
}

async fn status(
    Path(meeting_id): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let user_id = caller_id(&headers)?;
    let meeting = load_accessible_meeting(&state, &meeting_id, &user_id).await?;

    let report = state
        .db
        .call(move |conn| processing_status(conn, &meeting))
        .await?;

    Ok(Json(json!({
        "meetingId": report.meeting_id,
        "status": report.status,
        "progress": report.progress,
        "currentStep": report.current_step,
        "message": report.message,
        "startedAt": report.started_at,
        "completedAt": report.completed_at,
    })))
}

async fn events(
    Path(meeting_id): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let user_id = caller_id(&headers)?;
    load_accessible_meeting(&state, &meeting_id, &user_id).await?;

    let receiver = state.progress.subscribe(&meeting_id);
    debug!("Subscriber attached to {}", state.progress.topic_for(&meeting_id));

    Ok(ws.on_upgrade(move |socket| forward_events(socket, receiver)))
}

async fn forward_events(
    mut socket: WebSocket,
    mut receiver: broadcast::Receiver<ProgressEvent>,
) {
    loop {
        tokio::select! {
            event = receiver.recv() => match event {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                // Events are full snapshots; skipping lagged ones is safe.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = socket.recv() => match message {
                Some(Ok(_)) => continue,
                _ => break,
            },
        }
    }
}

/// Load the meeting and apply the access gate.
pub(crate) async fn load_accessible_meeting(
    state: &AppState,
    meeting_id: &str,
    user_id: &str,
) -> Result<MeetingRecord, ApiError> {
    let id = meeting_id.to_string();
    let user = user_id.to_string();
    let found = state
        .db
        .call(move |conn| {
            let Some(meeting) = MeetingRepository::get(conn, &id)? else {
                return Ok(None);
            };
            let allowed = access::has_access(conn, &meeting, &user)?;
            Ok(Some((meeting, allowed)))
        })
        .await?;

    match found {
        None => Err(ApiError::not_found("Meeting not found")),
        Some((_, false)) => Err(ApiError::forbidden("Access denied to this meeting")),
        Some((meeting, true)) => Ok(meeting),
    }
}
