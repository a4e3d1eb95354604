use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::state::AppState;

// liveness plus current window usage; never consumes an admission
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.policy.snapshot();
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "policy": {
            "minuteCount": snapshot.minute_count,
            "minuteWindowStart": snapshot.minute_start,
            "hourCount": snapshot.hour_count,
            "hourWindowStart": snapshot.hour_start,
        }
    }))
}
