//! Simple data models for the monitoring station.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

// ---

/// A plant growing in the pod, as configured by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    // ---
    pub name: String,
    pub species: String,
    pub planted_date: NaiveDate,
    pub position: String,
}

/// Latest known sensor readings; `None` until the first reading arrives.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    // ---
    pub lux: Option<f64>,
    pub temp_c: Option<f64>,
}

/// Estimated time to harvest as reported by the vision service.
///
/// Usually a number of days, occasionally free text such as `"ready now"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DaysToHarvest {
    Days(f64),
    Text(String),
}

impl DaysToHarvest {
    /// Days as a number, treating any "ready" wording as zero.
    pub fn as_days(&self) -> Option<f64> {
        // ---
        match self {
            DaysToHarvest::Days(d) => Some(*d),
            DaysToHarvest::Text(t) if t.to_lowercase().contains("ready") => Some(0.0),
            DaysToHarvest::Text(_) => None,
        }
    }
}

/// Per-plant assessment returned by the vision service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantObservation {
    // ---
    pub name: String,
    #[serde(default = "unknown_stage")]
    pub observed_stage: String,
    /// 1 = dead/dying .. 5 = excellent; 0 when the service omitted it.
    #[serde(default, deserialize_with = "lenient_score")]
    pub health_score: u8,
    #[serde(default)]
    pub observations: String,
    #[serde(default)]
    pub concerns: String,
    #[serde(default)]
    pub days_to_harvest: Option<DaysToHarvest>,
}

fn unknown_stage() -> String {
    "unknown".to_string()
}

/// The structured body the vision service is asked to return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    // ---
    #[serde(default)]
    pub plants: Vec<PlantObservation>,
    #[serde(default, deserialize_with = "lenient_optional_score")]
    pub overall_health: Option<u8>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub alerts: Vec<String>,
}

/// A 1..=5 score as the service wrote it: fractions round, out-of-range
/// values clamp, `null` is absent.
pub(crate) fn lenient_optional_score<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw
        .filter(|v| v.is_finite())
        .map(|v| v.round().clamp(1.0, 5.0) as u8))
}

fn lenient_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_optional_score(deserializer)?.unwrap_or(0))
}

/// One persisted analysis run: the service's report stamped with when,
/// from which photo, and under which sensor conditions it was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    // ---
    #[serde(flatten)]
    pub report: AnalysisReport,
    pub date: NaiveDate,
    /// `HH:MM`
    pub time: String,
    pub photo: String,
    #[serde(default)]
    pub sensors: SensorSnapshot,
}

impl AnalysisResult {
    // ---
    pub fn stamp(
        report: AnalysisReport,
        at: NaiveDateTime,
        photo: impl Into<String>,
        sensors: SensorSnapshot,
    ) -> Self {
        // ---
        AnalysisResult {
            report,
            date: at.date(),
            time: at.format("%H:%M").to_string(),
            photo: photo.into(),
            sensors,
        }
    }
}
