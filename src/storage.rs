//! Disk usage statistics for photos, timelapses and analysis records.

use std::{fs, path::Path};

use serde::Serialize;

use crate::{artifacts, config::StorageConfig, timelapse};

// ---

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct PhotoStats {
    pub count: usize,
    pub size_mb: f64,
    pub days: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct TimelapseStats {
    pub daily: usize,
    pub weekly: usize,
    pub size_mb: f64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct AnalysisStats {
    pub count: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct StorageStats {
    pub photos: PhotoStats,
    pub timelapse: TimelapseStats,
    pub analysis: AnalysisStats,
    pub total_size_mb: f64,
    pub max_storage_mb: u64,
    pub daily_avg_mb: f64,
    /// Days until `max_storage_mb` at the current daily average.
    pub forecast_days_to_full: Option<u64>,
}

/// Walk the storage directories and summarize their usage.
///
/// Missing directories count as empty.
pub fn collect(config: &StorageConfig) -> StorageStats {
    // ---
    let mut photo_bytes = 0u64;
    let mut photos = PhotoStats::default();
    for day in artifacts::date_dirs(&config.photo_dir) {
        photos.days += 1;
        for photo in artifacts::artifacts_in(&config.photo_dir.join(day)) {
            photos.count += 1;
            photo_bytes += file_size(&photo);
        }
    }
    photos.size_mb = round1(photo_bytes as f64 / BYTES_PER_MB);

    let mut video_bytes = 0u64;
    let mut videos = TimelapseStats::default();
    for (kind, count) in [
        (timelapse::Kind::Daily, &mut videos.daily),
        (timelapse::Kind::Weekly, &mut videos.weekly),
    ] {
        let dir = config.timelapse_dir.join(kind.dir_name());
        for name in files_with_suffix(&dir, timelapse::VIDEO_EXTENSION) {
            *count += 1;
            video_bytes += file_size(&dir.join(name));
        }
    }
    videos.size_mb = round1(video_bytes as f64 / BYTES_PER_MB);

    let analysis = AnalysisStats {
        count: files_with_suffix(&config.analysis_dir, ".json").len(),
    };

    let total_mb = photos.size_mb + videos.size_mb;
    let (daily_avg_mb, forecast_days_to_full) =
        forecast(total_mb, photos.days, config.max_storage_mb);

    StorageStats {
        photos,
        timelapse: videos,
        analysis,
        total_size_mb: round1(total_mb),
        max_storage_mb: config.max_storage_mb,
        daily_avg_mb,
        forecast_days_to_full,
    }
}

/// Average growth per tracked day and the days left before the budget is hit.
fn forecast(total_mb: f64, days_tracked: usize, max_mb: u64) -> (f64, Option<u64>) {
    if days_tracked == 0 {
        return (0.0, None);
    }
    let daily_avg = round1(total_mb / days_tracked as f64);
    let remaining = max_mb as f64 - total_mb;
    if daily_avg > 0.0 && remaining > 0.0 {
        (daily_avg, Some((remaining / daily_avg) as u64))
    } else {
        (daily_avg, None)
    }
}

fn files_with_suffix(dir: &Path, suffix: &str) -> Vec<String> {
    artifacts::sorted_file_names(dir)
        .into_iter()
        .filter(|n| n.ends_with(suffix))
        .collect()
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
