//! Application entry point for the `greenhouse-monitor` station service.
//!
//! This binary orchestrates the full startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Loading the plant list and herb reference data
//! - Connecting the optional PostgreSQL telemetry sink and creating its schema
//! - Starting the MQTT link (sensor feed in, summaries and heartbeat out)
//! - Registering the recurring jobs and spawning the scheduler
//! - Binding the Axum control surface and serving requests
//!
//! # Environment Variables
//! - `MQTT_BROKER` (**required**) – MQTT broker host
//! - `DATABASE_URL` (optional) – PostgreSQL connection string for telemetry
//! - `MONITOR_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `MONITOR_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See [`greenhouse_monitor::config::load_from_env`] for the full list.
use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use chrono::Local;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use greenhouse_monitor::{
    analysis::{AnthropicClient, HerbLibrary, VisionAnalyzer},
    config::{self, Config},
    jobs,
    pubsub::MqttLink,
    routes, schema,
    scheduler::{Scheduler, DEFAULT_POLL_INTERVAL},
    sensors::SensorCache,
    telemetry::{NoopSink, PgTelemetrySink, TelemetrySink},
    timelapse::FfmpegEncoder,
    AppState, Collaborators,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let plants = config::load_plants(&cfg.plants_file)?;
    let herbs = HerbLibrary::load(cfg.herbs_file.as_deref())?;
    tracing::info!(plants = plants.len(), herbs = herbs.len(), "Reference data loaded");

    let sink = connect_telemetry(&cfg).await?;

    let sensors = Arc::new(SensorCache::new());
    let link = MqttLink::start(&cfg.mqtt, Arc::clone(&sensors));

    let analyzer: Option<Arc<dyn VisionAnalyzer>> = match &cfg.analysis.api_key {
        Some(key) => Some(Arc::new(AnthropicClient::new(
            &cfg.analysis.api_url,
            key,
            &cfg.analysis.model,
        ))),
        None => {
            tracing::warn!("ANTHROPIC_API_KEY not set, analysis runs will be skipped");
            None
        }
    };

    let http_port = cfg.http_port;
    let state = AppState::new(
        cfg,
        plants,
        herbs,
        sensors,
        Collaborators {
            encoder: Arc::new(FfmpegEncoder::default()),
            analyzer,
            sink,
            publisher: Arc::new(link),
        },
    );

    let mut scheduler = Scheduler::new(Local::now().naive_local(), DEFAULT_POLL_INTERVAL);
    jobs::register_jobs(&mut scheduler, &state);

    jobs::startup_capture(&state).await;
    tokio::spawn(scheduler.run());

    // Build app from routes gateway
    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Connect the Postgres telemetry sink, or fall back to a no-op sink when
/// `DATABASE_URL` is unset.
async fn connect_telemetry(cfg: &Config) -> Result<Arc<dyn TelemetrySink>> {
    // ---
    let Some(db_url) = cfg.db_url.as_deref() else {
        tracing::info!("DATABASE_URL not set, health telemetry disabled");
        return Ok(Arc::new(NoopSink));
    };

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(db_url)
        .await
        .context("Failed to connect to telemetry database")?;
    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;
    Ok(Arc::new(PgTelemetrySink::new(pool)))
}

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `MONITOR_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `MONITOR_LOG_LEVEL` env var
///
/// Call once at startup, before any logging macro runs.
fn init_tracing() {
    // ---
    let span_events = match env::var("MONITOR_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to MONITOR_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("MONITOR_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,rumqttc=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
