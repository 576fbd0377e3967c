//! Capture pipeline gateway.
//!
//! Produces one finalized photo per call: destination path from the wall
//! clock, a frame from the first working camera [`backend`], then rotation
//! and timestamp overlay from [`postprocess`]. A failed capture is an
//! expected runtime condition and surfaces as `None`, never as a panic.
//!
//! Frames land in a hidden sibling file first and only take their final
//! name once acquired. A finished photo is never replaced or removed.

use std::{
    fmt, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{Local, NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{artifacts, config::CaptureConfig};

use self::backend::{Camera, SystemCamera};

pub mod backend;
pub mod postprocess;

// ---

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no camera backend available")]
    NoBackend,

    #[error("{backend} failed (exit code {exit_code:?}): {stderr}")]
    ToolFailed {
        backend: &'static str,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{backend} timed out after {secs}s")]
    Timeout { backend: &'static str, secs: u64 },

    #[error("frame stream ended before a frame was kept")]
    StreamEnded,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("post-processing task failed: {0}")]
    Task(String),
}

/// Owns the photo directory and remembers the most recent good capture.
pub struct CapturePipeline {
    photo_dir: PathBuf,
    config: CaptureConfig,
    camera: Arc<dyn Camera>,
    last_capture: Mutex<Option<PathBuf>>,
}

impl fmt::Debug for CapturePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("photo_dir", &self.photo_dir)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CapturePipeline {
    pub fn new(photo_dir: impl Into<PathBuf>, config: CaptureConfig) -> Self {
        Self::with_camera(photo_dir, config, Arc::new(SystemCamera))
    }

    pub fn with_camera(
        photo_dir: impl Into<PathBuf>,
        config: CaptureConfig,
        camera: Arc<dyn Camera>,
    ) -> Self {
        CapturePipeline {
            photo_dir: photo_dir.into(),
            config,
            camera,
            last_capture: Mutex::new(None),
        }
    }

    pub fn photo_dir(&self) -> &Path {
        &self.photo_dir
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Capture now. Failures are logged and reported as `None`.
    pub async fn capture(&self) -> Option<PathBuf> {
        // ---
        match self.capture_at(Local::now().naive_local()).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "Capture failed");
                None
            }
        }
    }

    /// Capture a photo stamped with `at`.
    pub async fn capture_at(&self, at: NaiveDateTime) -> Result<PathBuf, CaptureError> {
        // ---
        let dest = artifacts::artifact_path(&self.photo_dir, at);
        let day_dir = dest.parent().unwrap_or(self.photo_dir.as_path()).to_path_buf();
        tokio::fs::create_dir_all(&day_dir).await?;

        // Dropping `frame` on any early return removes only the temp file.
        let frame = tempfile::Builder::new()
            .prefix(".capture-")
            .suffix(".jpg")
            .tempfile_in(&day_dir)?;

        let used = self.camera.acquire(&self.config, frame.path()).await?;
        debug!(backend = used, path = %dest.display(), "Frame acquired");

        self.finish(frame.path(), at).await;

        frame.persist_noclobber(&dest).map_err(|e| CaptureError::Io(e.error))?;

        info!(path = %dest.display(), "Photo captured");
        *self.lock_last() = Some(dest.clone());
        Ok(dest)
    }

    /// Rotate and label in place. Any failure keeps the photo as acquired.
    async fn finish(&self, frame: &Path, at: NaiveDateTime) {
        // ---
        let path = frame.to_path_buf();
        let rotation = self.config.rotation;
        let quality = self.config.quality;
        let label = at.format("%Y-%m-%d %H:%M").to_string();

        let result = tokio::task::spawn_blocking(move || {
            postprocess::finalize(&path, rotation, quality, &label)
        })
        .await
        .unwrap_or_else(|e| Err(CaptureError::Task(e.to_string())));

        if let Err(e) = result {
            warn!(path = %frame.display(), error = %e, "Post-processing failed, keeping raw frame");
        }
    }

    /// The most recent successful capture of this process, if it still exists.
    pub fn last_capture(&self) -> Option<PathBuf> {
        // ---
        self.lock_last().clone().filter(|p| p.is_file())
    }

    pub fn latest_artifact(&self) -> Option<PathBuf> {
        artifacts::latest_artifact(&self.photo_dir)
    }

    pub fn artifacts_for_date(&self, date: NaiveDate) -> Vec<PathBuf> {
        artifacts::artifacts_for_date(&self.photo_dir, date)
    }

    fn lock_last(&self) -> std::sync::MutexGuard<'_, Option<PathBuf>> {
        self.last_capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
