//! Timelapse assembler gateway.
//!
//! Two selections share one encoding procedure:
//! - daily: every photo of one date, oldest first
//! - weekly: the photo closest to noon for each day of an ISO week
//!
//! Output paths are deterministic, so regenerating overwrites.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use tracing::{error, info};

use crate::{artifacts, config::TimelapseConfig};

pub mod encoder;
pub mod status;

pub use encoder::{EncodeError, Encoder, FfmpegEncoder};
pub use status::{GenerationRequest, GenerationStatus, GenerationTicket, GenerationTracker, Outcome};

// ---

pub const VIDEO_EXTENSION: &str = ".mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Daily,
    Weekly,
}

impl Kind {
    pub fn dir_name(self) -> &'static str {
        match self {
            Kind::Daily => "daily",
            Kind::Weekly => "weekly",
        }
    }
}

/// Monday of ISO week `week` in ISO year `year`.
///
/// Week 1 is the week containing January 4th. Returns `None` for weeks the
/// year does not have (0, 54+, or 53 in a 52-week year).
pub fn iso_week_monday(year: i32, week: u32) -> Option<NaiveDate> {
    // ---
    if week == 0 || week > 53 {
        return None;
    }
    let jan4 = NaiveDate::from_ymd_opt(year, 1, 4)?;
    let week1 = jan4 - Duration::days(i64::from(jan4.weekday().number_from_monday()) - 1);
    let monday = week1 + Duration::weeks(i64::from(week) - 1);

    // The Thursday of an ISO week always lies in that ISO year.
    let thursday = monday + Duration::days(3);
    (thursday.year() == year).then_some(monday)
}

/// Seven consecutive dates starting at `monday`.
pub fn week_dates(monday: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    (0..7).map(move |offset| monday + Duration::days(offset))
}

pub fn week_label(year: i32, week: u32) -> String {
    format!("{year}-W{week:02}")
}

/// Available videos per kind, newest first.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct TimelapseListing {
    pub daily: Vec<String>,
    pub weekly: Vec<String>,
}

pub struct TimelapseAssembler {
    photo_dir: PathBuf,
    timelapse_dir: PathBuf,
    config: TimelapseConfig,
    encoder: Arc<dyn Encoder>,
}

impl TimelapseAssembler {
    pub fn new(
        photo_dir: impl Into<PathBuf>,
        timelapse_dir: impl Into<PathBuf>,
        config: TimelapseConfig,
        encoder: Arc<dyn Encoder>,
    ) -> Self {
        TimelapseAssembler {
            photo_dir: photo_dir.into(),
            timelapse_dir: timelapse_dir.into(),
            config,
            encoder,
        }
    }

    pub fn daily_output(&self, date: NaiveDate) -> PathBuf {
        self.timelapse_dir
            .join(Kind::Daily.dir_name())
            .join(format!("{}{VIDEO_EXTENSION}", artifacts::date_dir_name(date)))
    }

    pub fn weekly_output(&self, year: i32, week: u32) -> PathBuf {
        self.timelapse_dir
            .join(Kind::Weekly.dir_name())
            .join(format!("{}{VIDEO_EXTENSION}", week_label(year, week)))
    }

    /// Build the video for one day. `None` when skipped or on encoder failure.
    pub async fn daily(&self, date: NaiveDate) -> Option<PathBuf> {
        // ---
        let label = artifacts::date_dir_name(date);
        let frames = artifacts::artifacts_for_date(&self.photo_dir, date);
        self.assemble(&label, frames, self.daily_output(date)).await
    }

    /// Build the noon-per-day video for an ISO week.
    pub async fn weekly(&self, year: i32, week: u32) -> Option<PathBuf> {
        // ---
        let label = week_label(year, week);
        let frames = self.weekly_frames(year, week);
        self.assemble(&label, frames, self.weekly_output(year, week))
            .await
    }

    pub async fn generate(&self, request: GenerationRequest) -> Option<PathBuf> {
        match request {
            GenerationRequest::Daily { date } => self.daily(date).await,
            GenerationRequest::Weekly { year, week } => self.weekly(year, week).await,
        }
    }

    /// Noon-closest photo of each day of the week; empty days contribute nothing.
    pub fn weekly_frames(&self, year: i32, week: u32) -> Vec<PathBuf> {
        // ---
        let Some(monday) = iso_week_monday(year, week) else {
            return Vec::new();
        };
        week_dates(monday)
            .filter_map(|day| {
                let photos = artifacts::artifacts_for_date(&self.photo_dir, day);
                artifacts::closest_to_noon(&photos).cloned()
            })
            .collect()
    }

    async fn assemble(&self, label: &str, frames: Vec<PathBuf>, output: PathBuf) -> Option<PathBuf> {
        // ---
        if frames.len() < self.config.min_photos {
            info!(
                timelapse = %label,
                photos = frames.len(),
                needed = self.config.min_photos,
                "Skipping timelapse, not enough photos"
            );
            return None;
        }

        match encoder::encode_frames(
            self.encoder.as_ref(),
            &frames,
            self.config.fps,
            &output,
            label,
        )
        .await
        {
            Ok(()) => {
                info!(path = %output.display(), photos = frames.len(), "Generated timelapse");
                Some(output)
            }
            Err(e) => {
                error!(timelapse = %label, error = %e, "Timelapse encoding failed");
                None
            }
        }
    }

    pub fn list(&self) -> TimelapseListing {
        // ---
        let names = |kind: Kind| -> Vec<String> {
            let mut names: Vec<String> =
                artifacts::sorted_file_names(&self.timelapse_dir.join(kind.dir_name()))
                    .into_iter()
                    .filter(|n| n.ends_with(VIDEO_EXTENSION))
                    .collect();
            names.reverse();
            names
        };
        TimelapseListing {
            daily: names(Kind::Daily),
            weekly: names(Kind::Weekly),
        }
    }

    pub fn timelapse_dir(&self) -> &Path {
        &self.timelapse_dir
    }
}

/// Run `request` under `ticket`, recording the outcome when done.
pub async fn run_tracked(
    assembler: &TimelapseAssembler,
    ticket: GenerationTicket,
    request: GenerationRequest,
) -> Option<PathBuf> {
    // ---
    let result = assembler.generate(request).await;
    let outcome = match &result {
        Some(path) => Outcome::Generated {
            file: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        },
        None => Outcome::Skipped,
    };
    ticket.finish(outcome);
    result
}
