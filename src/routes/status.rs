use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router,
};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};

use crate::{
    analysis::{
        history::{self, RecordSummary},
        knowledge::{self, ConditionWarning},
    },
    app::AppState,
    models::SensorSnapshot,
    storage,
};

// ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/status", get(station_status))
        .route("/api/storage", get(storage_stats))
}

#[derive(Debug, Serialize)]
struct PlantStatus {
    name: String,
    species: String,
    position: String,
    planted_date: NaiveDate,
    age_days: i64,
    stage: String,
    progress: u8,
    advice: Vec<String>,
}

#[derive(Debug, Serialize)]
struct StationStatus {
    sensors: SensorSnapshot,
    plants: Vec<PlantStatus>,
    warnings: Vec<ConditionWarning>,
    last_photo: Option<String>,
    latest_analysis: Option<RecordSummary>,
}

/// Handle `GET /api/status`: sensors, per-plant growth and the latest analysis.
async fn station_status(State(state): State<AppState>) -> impl IntoResponse {
    // ---
    debug!("GET /api/status");

    let today = Local::now().date_naive();
    let sensors = state.sensors.read();

    let plants = state
        .plants
        .iter()
        .map(|plant| {
            let age = knowledge::plant_age(plant.planted_date, today);
            let stage = state.herbs.growth_stage(&plant.species, age);
            let advice = state
                .herbs
                .get(&plant.species)
                .map(|profile| knowledge::care_advice(profile, age, sensors.temp_c))
                .unwrap_or_default();
            PlantStatus {
                name: plant.name.clone(),
                species: plant.species.clone(),
                position: plant.position.clone(),
                planted_date: plant.planted_date,
                age_days: age,
                stage: stage.stage,
                progress: stage.progress,
                advice,
            }
        })
        .collect();

    let last_photo = state
        .capture
        .last_capture()
        .or_else(|| state.capture.latest_artifact())
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()));

    Json(StationStatus {
        sensors,
        plants,
        warnings: knowledge::check_conditions(&state.plants, &state.herbs, &sensors),
        last_photo,
        latest_analysis: history::load_latest(&state.config.storage.analysis_dir),
    })
}

/// Handle `GET /api/storage`. The directory walk runs off the async runtime.
async fn storage_stats(State(state): State<AppState>) -> impl IntoResponse {
    debug!("GET /api/storage");

    let config = state.config.storage.clone();
    match tokio::task::spawn_blocking(move || storage::collect(&config)).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => {
            error!(error = %e, "Storage statistics task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "message": "Failed to collect storage statistics"})),
            )
                .into_response()
        }
    }
}
