use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use serde_json::json;
use tracing::{error, info};

use crate::app::AppState;

// ---

pub fn router() -> Router<AppState> {
    Router::new().route("/api/capture", post(handler))
}

/// Handle `POST /api/capture`: one photo now, outside the schedule and
/// regardless of operating hours.
async fn handler(State(state): State<AppState>) -> impl IntoResponse {
    // ---
    info!("POST /api/capture");

    match state.capture.capture().await {
        Some(path) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            (StatusCode::OK, Json(json!({"status": "ok", "path": name}))).into_response()
        }
        None => {
            error!("Manual capture failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "message": "Capture failed"})),
            )
                .into_response()
        }
    }
}
