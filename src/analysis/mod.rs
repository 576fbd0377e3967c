//! Analysis pipeline gateway.
//!
//! One run: pick the photo, build the plant/sensor/history context, ask the
//! vision service, parse its reply, persist the stamped record, then forward
//! scores to telemetry and a summary to pub/sub. Only the persisted record is
//! essential; forwarding failures are logged and ignored.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{Local, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    capture::CapturePipeline,
    models::{AnalysisReport, AnalysisResult, Plant},
    pubsub::{AnalysisPublisher, PublishSummary},
    sensors::SensorCache,
    telemetry::{self, TelemetrySink},
};

pub mod client;
pub mod history;
pub mod knowledge;
pub mod prompt;
pub mod response;

pub use client::{AnthropicClient, VisionAnalyzer};
pub use knowledge::HerbLibrary;

// ---

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("analysis service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("analysis service returned no text")]
    EmptyResponse,

    #[error("failed to parse analysis response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub struct AnalysisPipeline {
    analysis_dir: PathBuf,
    plants: Arc<Vec<Plant>>,
    herbs: Arc<HerbLibrary>,
    sensors: Arc<SensorCache>,
    capture: Arc<CapturePipeline>,
    /// `None` when no API credential is configured.
    analyzer: Option<Arc<dyn VisionAnalyzer>>,
    sink: Arc<dyn TelemetrySink>,
    publisher: Arc<dyn AnalysisPublisher>,
}

impl AnalysisPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        analysis_dir: impl Into<PathBuf>,
        plants: Arc<Vec<Plant>>,
        herbs: Arc<HerbLibrary>,
        sensors: Arc<SensorCache>,
        capture: Arc<CapturePipeline>,
        analyzer: Option<Arc<dyn VisionAnalyzer>>,
        sink: Arc<dyn TelemetrySink>,
        publisher: Arc<dyn AnalysisPublisher>,
    ) -> Self {
        AnalysisPipeline {
            analysis_dir: analysis_dir.into(),
            plants,
            herbs,
            sensors,
            capture,
            analyzer,
            sink,
            publisher,
        }
    }

    /// Run one analysis now. `None` means the run was skipped or failed.
    pub async fn analyze(&self) -> Option<AnalysisResult> {
        self.analyze_at(Local::now().naive_local()).await
    }

    pub async fn analyze_at(&self, now: NaiveDateTime) -> Option<AnalysisResult> {
        // ---
        let Some(photo) = self
            .capture
            .last_capture()
            .or_else(|| self.capture.latest_artifact())
        else {
            warn!("No photo available for analysis");
            return None;
        };

        let Some(analyzer) = self.analyzer.as_ref() else {
            error!("ANTHROPIC_API_KEY not set, skipping analysis");
            return None;
        };

        let snapshot = self.sensors.read();
        let previous = history::load_latest(&self.analysis_dir);
        let context = prompt::build_prompt(
            &self.plants,
            &self.herbs,
            &snapshot,
            previous.as_ref(),
            now.date(),
        );

        let report = match self.request(analyzer.as_ref(), &photo, &context).await {
            Ok(report) => report,
            Err(e) => {
                error!(photo = %photo.display(), error = %e, "Analysis failed");
                return None;
            }
        };

        let photo_name = photo
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let result = AnalysisResult::stamp(report, now, photo_name, snapshot);

        match history::persist(&self.analysis_dir, &result, now) {
            Ok(path) => info!(
                path = %path.display(),
                overall_health = ?result.report.overall_health,
                "Analysis saved"
            ),
            Err(e) => {
                error!(error = %e, "Failed to save analysis");
                return None;
            }
        }

        self.forward(&result, now).await;
        Some(result)
    }

    async fn request(
        &self,
        analyzer: &dyn VisionAnalyzer,
        photo: &Path,
        context: &str,
    ) -> Result<AnalysisReport, AnalysisError> {
        // ---
        let jpeg = tokio::fs::read(photo).await?;
        let text = analyzer.analyze(&jpeg, context).await?;
        response::parse_report(&text).inspect_err(|_| {
            debug!(raw = %text, "Unparseable analysis response");
        })
    }

    /// Best-effort telemetry and pub/sub forwarding.
    async fn forward(&self, result: &AnalysisResult, now: NaiveDateTime) {
        // ---
        let points = telemetry::health_points(&result.report);
        if let Err(e) = self.sink.write_health(&points, Utc::now()).await {
            warn!(error = %e, "Failed to write health scores");
        }

        if self.publisher.is_connected() {
            let summary = PublishSummary::from_result(result, &self.plants, now.date());
            if let Err(e) = self.publisher.publish_summary(&summary).await {
                warn!(error = %e, "Failed to publish analysis summary");
            }
        }
    }
}
