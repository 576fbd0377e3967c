//! Photo artifact naming scheme and directory scans.
//!
//! Photos live at `{photo_dir}/{YYYY-MM-DD}/{YYYY-MM-DD}_{HH-MM}.jpg`, so a
//! plain lexicographic sort of either level is also chronological.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{NaiveDate, NaiveDateTime};

// ---

pub const PHOTO_EXTENSION: &str = ".jpg";

/// Minutes since midnight of the preferred archive frame.
pub const SOLAR_NOON_MINUTES: u32 = 720;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Name of the per-day directory for `date`.
pub fn date_dir_name(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a per-day directory name back into a date.
pub fn parse_date_dir(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name, DATE_FORMAT).ok()
}

/// Destination of a photo captured at `at`.
pub fn artifact_path(photo_dir: &Path, at: NaiveDateTime) -> PathBuf {
    // ---
    photo_dir
        .join(date_dir_name(at.date()))
        .join(format!("{}{}", at.format("%Y-%m-%d_%H-%M"), PHOTO_EXTENSION))
}

/// In-flight captures are hidden dot-files and never count as artifacts.
pub fn is_artifact_name(name: &str) -> bool {
    !name.starts_with('.') && name.ends_with(PHOTO_EXTENSION)
}

/// Capture time embedded in an artifact file name, as minutes since midnight.
///
/// `2026-02-08_12-05.jpg` yields `725`. Names that do not follow the scheme
/// yield `None`.
pub fn capture_minutes(file_name: &str) -> Option<u32> {
    // ---
    let stem = file_name.strip_suffix(PHOTO_EXTENSION)?;
    let clock = stem.rsplit('_').next()?;
    let mut parts = clock.split('-');
    let hour: u32 = parts.next()?.parse().ok()?;
    let minute: u32 = parts.next()?.parse().ok()?;
    Some(hour * 60 + minute)
}

/// Pick the artifact captured closest to solar noon.
///
/// `candidates` must already be in sorted filename order; on equal distance
/// the earliest candidate wins. Entries whose names carry no capture time
/// are passed over.
pub fn closest_to_noon(candidates: &[PathBuf]) -> Option<&PathBuf> {
    // ---
    let mut best: Option<(&PathBuf, u32)> = None;
    for candidate in candidates {
        let Some(minutes) = candidate
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(capture_minutes)
        else {
            continue;
        };
        let diff = minutes.abs_diff(SOLAR_NOON_MINUTES);
        match best {
            Some((_, best_diff)) if diff >= best_diff => {}
            _ => best = Some((candidate, diff)),
        }
    }
    best.map(|(path, _)| path)
}

/// Sorted file names in `dir` (regular files only); empty if unreadable.
pub fn sorted_file_names(dir: &Path) -> Vec<String> {
    // ---
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}

/// Artifacts in one directory in ascending chronological order.
pub fn artifacts_in(dir: &Path) -> Vec<PathBuf> {
    // ---
    sorted_file_names(dir)
        .into_iter()
        .filter(|n| is_artifact_name(n))
        .map(|n| dir.join(n))
        .collect()
}

/// Names of the sub-directories of `photo_dir`, ascending.
pub fn date_dirs(photo_dir: &Path) -> Vec<String> {
    // ---
    let Ok(entries) = fs::read_dir(photo_dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}

/// The newest artifact: newest date directory that has any, newest file in it.
pub fn latest_artifact(photo_dir: &Path) -> Option<PathBuf> {
    // ---
    date_dirs(photo_dir)
        .iter()
        .rev()
        .find_map(|d| artifacts_in(&photo_dir.join(d)).pop())
}

/// All artifacts captured on `date`, oldest first.
pub fn artifacts_for_date(photo_dir: &Path, date: NaiveDate) -> Vec<PathBuf> {
    artifacts_in(&photo_dir.join(date_dir_name(date)))
}
