//! AI service health probe.

use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::{json, Value};

use crate::api::AppState;
use crate::db::now_str;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ai/health", get(ai_health))
        .with_state(state)
}

async fn ai_health(State(state): State<AppState>) -> Json<Value> {
    let healthy = state.ai.health().await;
    Json(json!({
        "healthy": healthy,
        "message": if healthy {
            "AI service is healthy"
        } else {
            "AI service is unavailable"
        },
        "checked_at": now_str(),
    }))
}
