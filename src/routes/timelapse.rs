//! On-demand timelapse generation and listing.
//!
//! Generation runs in the background; the caller gets a request id at once
//! and polls `/api/timelapse/status` for the outcome. Only one generation
//! may be in flight, scheduled or on demand.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    app::AppState,
    timelapse::{self, GenerationRequest},
};

// ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/timelapse", get(list))
        .route("/api/timelapse/status", get(status))
        .route("/api/timelapse/daily/{date}", post(daily))
        .route("/api/timelapse/weekly/{year}/{week}", post(weekly))
}

async fn daily(State(state): State<AppState>, Path(date): Path<String>) -> Response {
    let Ok(date) = NaiveDate::parse_from_str(&date, "%Y-%m-%d") else {
        return bad_request(format!("Invalid date '{date}', expected YYYY-MM-DD"));
    };
    start(state, GenerationRequest::Daily { date })
}

async fn weekly(State(state): State<AppState>, Path((year, week)): Path<(i32, u32)>) -> Response {
    if timelapse::iso_week_monday(year, week).is_none() {
        return bad_request(format!("Invalid ISO week {year}-W{week:02}"));
    }
    start(state, GenerationRequest::Weekly { year, week })
}

/// Take the generation flag and hand the work to a background task.
fn start(state: AppState, request: GenerationRequest) -> Response {
    // ---
    let Some(ticket) = state.generation.try_begin(request) else {
        warn!(%request, "Rejected timelapse request, generation already running");
        return (
            StatusCode::CONFLICT,
            Json(json!({
                "status": "busy",
                "message": "Timelapse generation already in progress",
            })),
        )
            .into_response();
    };

    let id = ticket.id();
    info!(%request, %id, "Timelapse generation requested");
    tokio::spawn(async move {
        timelapse::run_tracked(&state.timelapse, ticket, request).await;
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({"status": "started", "id": id})),
    )
        .into_response()
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.generation.snapshot())
}

async fn list(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.timelapse.list())
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"status": "error", "message": message})),
    )
        .into_response()
}
