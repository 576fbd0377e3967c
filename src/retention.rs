//! Age-based thinning of the photo archive.
//!
//! Day directories older than the retention window are reduced to their
//! single photo closest to solar noon. Recent days stay untouched.

use std::{fs, path::Path};

use chrono::{Duration, Local, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::artifacts;

// ---

/// Outcome of one retention sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PruneSummary {
    pub removed: usize,
    pub kept: usize,
    pub directories_removed: usize,
}

/// Thin every day older than `today - retention_days`, using the local date.
pub fn prune(photo_dir: &Path, retention_days: u32) -> PruneSummary {
    prune_at(photo_dir, retention_days, Local::now().date_naive())
}

/// Same as [`prune`] with an explicit `today`.
pub fn prune_at(photo_dir: &Path, retention_days: u32, today: NaiveDate) -> PruneSummary {
    // ---
    let cutoff = today - Duration::days(i64::from(retention_days));
    let mut summary = PruneSummary::default();

    for name in artifacts::date_dirs(photo_dir) {
        let Some(date) = artifacts::parse_date_dir(&name) else {
            debug!(dir = %name, "Skipping non-date directory");
            continue;
        };
        if date >= cutoff {
            continue;
        }
        prune_day(&photo_dir.join(&name), &mut summary);
    }

    if summary.removed > 0 || summary.directories_removed > 0 {
        info!(
            removed = summary.removed,
            kept = summary.kept,
            directories_removed = summary.directories_removed,
            "Retention sweep finished"
        );
    }
    summary
}

fn prune_day(dir: &Path, summary: &mut PruneSummary) {
    // ---
    let photos = artifacts::artifacts_in(dir);
    let survivor = artifacts::closest_to_noon(&photos).cloned();

    for photo in &photos {
        if Some(photo) == survivor.as_ref() {
            summary.kept += 1;
            continue;
        }
        match fs::remove_file(photo) {
            Ok(()) => summary.removed += 1,
            Err(e) => warn!(path = %photo.display(), error = %e, "Failed to delete photo"),
        }
    }

    let is_empty = fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);
    if is_empty {
        match fs::remove_dir(dir) {
            Ok(()) => summary.directories_removed += 1,
            Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to remove directory"),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::path::PathBuf;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 20).unwrap()
    }

    fn seed_day(root: &Path, date: NaiveDate, times: &[&str]) -> PathBuf {
        // ---
        let dir = root.join(artifacts::date_dir_name(date));
        fs::create_dir_all(&dir).unwrap();
        for t in times {
            fs::write(dir.join(format!("{}_{t}.jpg", date.format("%Y-%m-%d"))), b"x").unwrap();
        }
        dir
    }

    fn listing(dir: &Path) -> Vec<String> {
        artifacts::sorted_file_names(dir)
    }

    #[test]
    fn test_old_day_keeps_only_noon_photo() {
        // ---
        let tmp = tempfile::tempdir().unwrap();
        let old = today() - Duration::days(40);
        let recent = today() - Duration::days(10);
        let old_dir = seed_day(tmp.path(), old, &["08-00", "12-05", "18-00"]);
        let recent_dir = seed_day(tmp.path(), recent, &["08-00", "12-05", "18-00"]);

        let summary = prune_at(tmp.path(), 30, today());

        assert_eq!(
            listing(&old_dir),
            vec![format!("{}_12-05.jpg", old.format("%Y-%m-%d"))]
        );
        assert_eq!(listing(&recent_dir).len(), 3, "recent day must be untouched");
        assert_eq!(
            summary,
            PruneSummary {
                removed: 2,
                kept: 1,
                directories_removed: 0
            }
        );
    }

    #[test]
    fn test_second_sweep_is_a_no_op() {
        // ---
        let tmp = tempfile::tempdir().unwrap();
        seed_day(tmp.path(), today() - Duration::days(45), &["07-00", "11-00", "16-00"]);

        prune_at(tmp.path(), 30, today());
        let again = prune_at(tmp.path(), 30, today());
        assert_eq!(again.removed, 0);
        assert_eq!(again.kept, 1);
    }

    #[test]
    fn test_empty_old_directory_removed_and_invalid_names_skipped() {
        // ---
        let tmp = tempfile::tempdir().unwrap();
        let empty = seed_day(tmp.path(), today() - Duration::days(60), &[]);
        let odd = tmp.path().join("2025-13-45");
        fs::create_dir_all(&odd).unwrap();
        fs::write(odd.join("2025-01-01_08-00.jpg"), b"x").unwrap();
        let misc = tmp.path().join("exports");
        fs::create_dir_all(&misc).unwrap();

        let summary = prune_at(tmp.path(), 30, today());

        assert!(!empty.exists());
        assert_eq!(summary.directories_removed, 1);
        assert!(odd.join("2025-01-01_08-00.jpg").exists());
        assert!(misc.exists());
    }

    #[test]
    fn test_non_photo_files_survive_and_keep_directory() {
        // ---
        let tmp = tempfile::tempdir().unwrap();
        let dir = seed_day(tmp.path(), today() - Duration::days(31), &["09-00"]);
        fs::write(dir.join("notes.txt"), b"keep me").unwrap();

        let summary = prune_at(tmp.path(), 30, today());

        assert_eq!(summary.removed, 0);
        assert!(dir.join("notes.txt").exists());
        assert_eq!(listing(&dir).len(), 2);
    }

    #[test]
    fn test_cutoff_day_itself_is_kept_dense() {
        // ---
        let tmp = tempfile::tempdir().unwrap();
        let dir = seed_day(tmp.path(), today() - Duration::days(30), &["08-00", "12-00"]);

        prune_at(tmp.path(), 30, today());
        assert_eq!(listing(&dir).len(), 2);
    }

    #[test]
    fn test_missing_photo_dir_is_harmless() {
        // ---
        let tmp = tempfile::tempdir().unwrap();
        let summary = prune_at(&tmp.path().join("nope"), 30, today());
        assert_eq!(summary, PruneSummary::default());
    }
}
