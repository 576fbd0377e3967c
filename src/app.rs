//! Shared application state.
//!
//! Everything long-lived is built once at startup and handed out as `Arc`s:
//! the scheduler's jobs and the HTTP handlers see the same pipelines, the
//! same sensor cache and the same generation flag.

use std::sync::Arc;

use crate::{
    analysis::{AnalysisPipeline, HerbLibrary, VisionAnalyzer},
    capture::CapturePipeline,
    config::Config,
    models::Plant,
    pubsub::AnalysisPublisher,
    sensors::SensorCache,
    telemetry::TelemetrySink,
    timelapse::{Encoder, GenerationTracker, TimelapseAssembler},
};

// ---

/// External collaborators, swappable for fakes in tests.
pub struct Collaborators {
    pub encoder: Arc<dyn Encoder>,
    /// `None` when no API credential is configured.
    pub analyzer: Option<Arc<dyn VisionAnalyzer>>,
    pub sink: Arc<dyn TelemetrySink>,
    pub publisher: Arc<dyn AnalysisPublisher>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub plants: Arc<Vec<Plant>>,
    pub herbs: Arc<HerbLibrary>,
    pub sensors: Arc<SensorCache>,
    pub capture: Arc<CapturePipeline>,
    pub timelapse: Arc<TimelapseAssembler>,
    pub generation: GenerationTracker,
    pub analysis: Arc<AnalysisPipeline>,
}

impl AppState {
    pub fn new(
        config: Config,
        plants: Vec<Plant>,
        herbs: HerbLibrary,
        sensors: Arc<SensorCache>,
        collaborators: Collaborators,
    ) -> Self {
        // ---
        let plants = Arc::new(plants);
        let herbs = Arc::new(herbs);
        let storage = &config.storage;

        let capture = Arc::new(CapturePipeline::new(
            &storage.photo_dir,
            config.capture.clone(),
        ));
        let timelapse = Arc::new(TimelapseAssembler::new(
            &storage.photo_dir,
            &storage.timelapse_dir,
            config.timelapse.clone(),
            collaborators.encoder,
        ));
        let analysis = Arc::new(AnalysisPipeline::new(
            &storage.analysis_dir,
            Arc::clone(&plants),
            Arc::clone(&herbs),
            Arc::clone(&sensors),
            Arc::clone(&capture),
            collaborators.analyzer,
            collaborators.sink,
            collaborators.publisher,
        ));

        AppState {
            config: Arc::new(config),
            plants,
            herbs,
            sensors,
            capture,
            timelapse,
            generation: GenerationTracker::new(),
            analysis,
        }
    }
}
