//! Persisted analysis records.
//!
//! One pretty-printed JSON file per run, `{YYYY-MM-DD}_{HH-MM}.json`. Files
//! are never overwritten: a same-minute collision gets a zero-padded `_02`,
//! `_03` suffix, which still sorts after the unsuffixed name. A record only
//! appears under its final name once fully written.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    artifacts,
    models::{self, AnalysisResult},
};

// ---

const RECORD_EXTENSION: &str = ".json";

/// Two-digit suffixes keep name order equal to write order.
const MAX_RECORDS_PER_MINUTE: u32 = 99;

/// The parts of a prior record that downstream readers rely on.
///
/// Deliberately lenient so an older or hand-edited record still reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "models::lenient_optional_score")]
    pub overall_health: Option<u8>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub alerts: Vec<String>,
}

/// Newest record by file name.
pub fn latest_record_path(analysis_dir: &Path) -> Option<PathBuf> {
    // ---
    artifacts::sorted_file_names(analysis_dir)
        .into_iter()
        .filter(|n| n.ends_with(RECORD_EXTENSION))
        .next_back()
        .map(|n| analysis_dir.join(n))
}

/// Newest record, or `None` when there is none or it cannot be parsed.
pub fn load_latest(analysis_dir: &Path) -> Option<RecordSummary> {
    // ---
    let path = latest_record_path(analysis_dir)?;
    let raw = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(summary) => Some(summary),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Ignoring unreadable analysis record");
            None
        }
    }
}

/// Write `result` as a new record keyed by `at`.
pub fn persist(analysis_dir: &Path, result: &AnalysisResult, at: NaiveDateTime) -> io::Result<PathBuf> {
    // ---
    fs::create_dir_all(analysis_dir)?;
    let body = serde_json::to_string_pretty(result).map_err(io::Error::other)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".record-")
        .suffix(".partial")
        .tempfile_in(analysis_dir)?;
    temp.write_all(body.as_bytes())?;
    temp.as_file().sync_all()?;

    let stem = at.format("%Y-%m-%d_%H-%M").to_string();
    for attempt in 1..=MAX_RECORDS_PER_MINUTE {
        let name = match attempt {
            1 => format!("{stem}{RECORD_EXTENSION}"),
            n => format!("{stem}_{n:02}{RECORD_EXTENSION}"),
        };
        let path = analysis_dir.join(name);
        match temp.persist_noclobber(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => temp = e.file,
            Err(e) => return Err(e.error),
        }
    }
    Err(io::Error::other(format!("no free analysis record name for {stem}")))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{AnalysisReport, SensorSnapshot};
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 8)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn result(summary: &str, when: NaiveDateTime) -> AnalysisResult {
        // ---
        AnalysisResult::stamp(
            AnalysisReport {
                plants: vec![],
                overall_health: Some(4),
                summary: summary.into(),
                alerts: vec!["Check pump".into()],
            },
            when,
            "2026-02-08_10-00.jpg",
            SensorSnapshot::default(),
        )
    }

    #[test]
    fn test_same_minute_runs_never_overwrite() {
        // ---
        let tmp = tempfile::tempdir().unwrap();
        let first = persist(tmp.path(), &result("first", at(10, 0)), at(10, 0)).unwrap();
        let second = persist(tmp.path(), &result("second", at(10, 0)), at(10, 0)).unwrap();

        assert!(first.ends_with("2026-02-08_10-00.json"));
        assert!(second.ends_with("2026-02-08_10-00_02.json"));
        assert_eq!(load_latest(tmp.path()).unwrap().summary, "second");
    }

    #[test]
    fn test_latest_is_newest_by_name() {
        // ---
        let tmp = tempfile::tempdir().unwrap();
        persist(tmp.path(), &result("evening", at(18, 0)), at(18, 0)).unwrap();
        persist(tmp.path(), &result("morning", at(10, 0)), at(10, 0)).unwrap();
        fs::write(tmp.path().join("zz-notes.txt"), "x").unwrap();

        let latest = load_latest(tmp.path()).unwrap();
        assert_eq!(latest.summary, "evening");
        assert_eq!(latest.date.as_deref(), Some("2026-02-08"));
        assert_eq!(latest.alerts, vec!["Check pump"]);
    }

    #[test]
    fn test_unreadable_or_missing_history_is_absent() {
        // ---
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(load_latest(tmp.path()), None);
        assert_eq!(load_latest(&tmp.path().join("missing")), None);

        fs::write(tmp.path().join("2026-02-09_10-00.json"), "{ truncated").unwrap();
        assert_eq!(load_latest(tmp.path()), None);
    }

    #[test]
    fn test_many_same_minute_runs_keep_write_order() {
        // ---
        let tmp = tempfile::tempdir().unwrap();
        for i in 1..=11 {
            persist(tmp.path(), &result(&format!("run {i}"), at(10, 0)), at(10, 0)).unwrap();
        }

        assert!(tmp.path().join("2026-02-08_10-00_11.json").exists());
        assert_eq!(load_latest(tmp.path()).unwrap().summary, "run 11");
    }

    #[test]
    fn test_only_complete_records_are_left_behind() {
        // ---
        let tmp = tempfile::tempdir().unwrap();
        persist(tmp.path(), &result("first", at(10, 0)), at(10, 0)).unwrap();
        persist(tmp.path(), &result("second", at(10, 0)), at(10, 0)).unwrap();

        let mut names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["2026-02-08_10-00.json", "2026-02-08_10-00_02.json"]);

        let first: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(tmp.path().join(&names[0])).unwrap()).unwrap();
        assert_eq!(first["summary"], "first");
    }

    #[test]
    fn test_fractional_overall_health_in_a_record_reads() {
        // ---
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("2026-02-09_10-00.json"),
            r#"{"overall_health": 3.6, "summary": "Fine"}"#,
        )
        .unwrap();

        let latest = load_latest(tmp.path()).unwrap();
        assert_eq!(latest.overall_health, Some(4));
        assert_eq!(latest.summary, "Fine");
    }
}
