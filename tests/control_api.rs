use std::{collections::HashMap, fs, net::SocketAddr, path::Path, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::sync::Notify;

use greenhouse_monitor::{
    analysis::HerbLibrary,
    config,
    models::Plant,
    pubsub::{AnalysisPublisher, PublishSummary},
    routes,
    sensors::SensorCache,
    telemetry::NoopSink,
    timelapse::{EncodeError, Encoder},
    AppState, Collaborators,
};

// ---

/// Writes a placeholder video once released.
struct GatedEncoder {
    release: Arc<Notify>,
}

#[async_trait]
impl Encoder for GatedEncoder {
    async fn encode(&self, _manifest: &Path, _fps: u32, output: &Path) -> Result<(), EncodeError> {
        self.release.notified().await;
        tokio::fs::write(output, b"mp4").await?;
        Ok(())
    }
}

struct SilentPublisher;

#[async_trait]
impl AnalysisPublisher for SilentPublisher {
    async fn publish_summary(&self, _summary: &PublishSummary) -> Result<()> {
        Ok(())
    }
}

struct Station {
    base: String,
    client: Client,
    release: Arc<Notify>,
    _root: tempfile::TempDir,
}

/// Serve the control surface on an ephemeral port over a scratch directory
/// holding three photos of 2026-02-08.
async fn start_station() -> Result<Station> {
    // ---
    let root = tempfile::tempdir()?;
    let day = root.path().join("photos/2026-02-08");
    fs::create_dir_all(&day)?;
    for name in [
        "2026-02-08_09-00.jpg",
        "2026-02-08_12-00.jpg",
        "2026-02-08_15-00.jpg",
    ] {
        fs::write(day.join(name), b"jpeg")?;
    }

    let vars: HashMap<&str, String> = HashMap::from([
        ("MQTT_BROKER", "localhost".to_string()),
        ("PHOTO_DIR", root.path().join("photos").display().to_string()),
        ("TIMELAPSE_DIR", root.path().join("timelapse").display().to_string()),
        ("ANALYSIS_DIR", root.path().join("analysis").display().to_string()),
        ("TIMELAPSE_MIN_PHOTOS", "3".to_string()),
    ]);
    let cfg = config::load_with(|name| vars.get(name).cloned())?;

    let plants = vec![Plant {
        name: "Genovese".into(),
        species: "basil".into(),
        planted_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        position: "left".into(),
    }];

    let release = Arc::new(Notify::new());
    let state = AppState::new(
        cfg,
        plants,
        HerbLibrary::embedded()?,
        Arc::new(SensorCache::new()),
        Collaborators {
            encoder: Arc::new(GatedEncoder {
                release: Arc::clone(&release),
            }),
            analyzer: None,
            sink: Arc::new(NoopSink),
            publisher: Arc::new(SilentPublisher),
        },
    );

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;
    let app = routes::router(state);
    tokio::spawn(async move { axum::serve(listener, app).await });

    Ok(Station {
        base: format!("http://{addr}"),
        client: Client::new(),
        release,
        _root: root,
    })
}

/// Poll the generation status until it is idle again.
async fn wait_until_idle(station: &Station) -> Result<Value> {
    // ---
    for _ in 0..100 {
        let status: Value = station
            .client
            .get(format!("{}/api/timelapse/status", station.base))
            .send()
            .await?
            .json()
            .await?;
        if status["state"] == "idle" {
            return Ok(status);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    anyhow::bail!("generation never finished")
}

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    // ---
    let station = start_station().await?;
    let body: Value = station
        .client
        .get(format!("{}/health", station.base))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn daily_timelapse_runs_once_at_a_time() -> Result<()> {
    // ---
    let station = start_station().await?;
    let url = format!("{}/api/timelapse/daily/2026-02-08", station.base);

    let first = station.client.post(&url).send().await?;
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    let accepted: Value = first.json().await?;
    assert!(accepted["id"].is_string());

    // The encoder is parked, so the first run still holds the flag.
    let second = station.client.post(&url).send().await?;
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let busy: Value = station
        .client
        .get(format!("{}/api/timelapse/status", station.base))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(busy["state"], "generating");
    assert_eq!(busy["current"]["request"]["kind"], "daily");

    station.release.notify_one();
    let done = wait_until_idle(&station).await?;
    assert_eq!(done["last"]["id"], accepted["id"]);
    assert_eq!(done["last"]["outcome"]["result"], "generated");
    assert_eq!(done["last"]["outcome"]["file"], "2026-02-08.mp4");

    let listing: Value = station
        .client
        .get(format!("{}/api/timelapse", station.base))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(listing["daily"], serde_json::json!(["2026-02-08.mp4"]));
    assert_eq!(listing["weekly"], serde_json::json!([]));
    Ok(())
}

#[tokio::test]
async fn weekly_timelapse_below_threshold_is_skipped() -> Result<()> {
    // ---
    let station = start_station().await?;

    // One noon photo for the whole week, three required.
    let response = station
        .client
        .post(format!("{}/api/timelapse/weekly/2026/6", station.base))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let done = wait_until_idle(&station).await?;
    assert_eq!(done["last"]["request"]["kind"], "weekly");
    assert_eq!(done["last"]["outcome"]["result"], "skipped");
    Ok(())
}

#[tokio::test]
async fn invalid_generation_requests_are_rejected() -> Result<()> {
    // ---
    let station = start_station().await?;

    for path in [
        "/api/timelapse/daily/2026-13-01",
        "/api/timelapse/daily/yesterday",
        "/api/timelapse/weekly/2026/54",
        "/api/timelapse/weekly/2026/0",
        "/api/timelapse/weekly/2026/six",
    ] {
        let response = station
            .client
            .post(format!("{}{path}", station.base))
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{path}");
    }

    let status: Value = station
        .client
        .get(format!("{}/api/timelapse/status", station.base))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status["state"], "idle");
    assert!(status["last"].is_null());
    Ok(())
}

#[tokio::test]
async fn storage_and_status_reflect_the_station() -> Result<()> {
    // ---
    let station = start_station().await?;

    let storage: Value = station
        .client
        .get(format!("{}/api/storage", station.base))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(storage["photos"]["count"], 3);
    assert_eq!(storage["photos"]["days"], 1);
    assert_eq!(storage["analysis"]["count"], 0);

    let status: Value = station
        .client
        .get(format!("{}/api/status", station.base))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status["last_photo"], "2026-02-08_15-00.jpg");
    assert!(status["latest_analysis"].is_null());
    assert!(status["warnings"].as_array().unwrap().is_empty());

    let plant = &status["plants"][0];
    assert_eq!(plant["name"], "Genovese");
    assert_eq!(plant["species"], "basil");
    assert!(plant["age_days"].as_i64().unwrap() > 60);
    assert_eq!(plant["stage"], "mature");
    assert_eq!(plant["progress"], 100);
    Ok(())
}
