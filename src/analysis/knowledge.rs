//! Per-species herb reference data and the growth arithmetic built on it.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Plant, SensorSnapshot};

// ---

const EMBEDDED_HERBS: &str = include_str!("../../data/herbs.json");

/// One entry of a species' ordered stage table. `end: None` is open-ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrowthStage {
    pub name: String,
    pub start: u32,
    pub end: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HerbProfile {
    pub display_name: String,
    pub scientific_name: String,
    pub germination_days: [u32; 2],
    pub days_to_harvest: [u32; 2],
    pub growth_stages: Vec<GrowthStage>,
    pub temp_min_c: f64,
    pub temp_max_c: f64,
    #[serde(default)]
    pub harvest_tips: String,
}

/// Stage name plus how far through it a plant is, 0..=100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageProgress {
    pub stage: String,
    pub progress: u8,
}

impl StageProgress {
    fn new(stage: &str, progress: u8) -> Self {
        StageProgress {
            stage: stage.to_string(),
            progress,
        }
    }
}

/// Herb profiles keyed by species id. Loaded once at startup and shared.
#[derive(Debug, Clone, Default)]
pub struct HerbLibrary {
    herbs: BTreeMap<String, HerbProfile>,
}

impl HerbLibrary {
    /// The built-in table.
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED_HERBS).context("Built-in herb table is invalid")
    }

    /// `path` overrides the built-in table when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // ---
        match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read herbs file {}", path.display()))?;
                Self::from_json(&raw)
                    .with_context(|| format!("Failed to parse herbs file {}", path.display()))
            }
            None => Self::embedded(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(HerbLibrary {
            herbs: serde_json::from_str(raw)?,
        })
    }

    pub fn get(&self, species: &str) -> Option<&HerbProfile> {
        self.herbs.get(species)
    }

    pub fn len(&self) -> usize {
        self.herbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.herbs.is_empty()
    }

    /// Stage of `species` at `age` days; `unknown`/0 for species not in the table.
    pub fn growth_stage(&self, species: &str, age: i64) -> StageProgress {
        match self.get(species) {
            Some(profile) => stage_for(&profile.growth_stages, age),
            None => StageProgress::new("unknown", 0),
        }
    }
}

/// Days since planting; negative for a future planting date.
pub fn plant_age(planted: NaiveDate, today: NaiveDate) -> i64 {
    (today - planted).num_days()
}

/// Locate `age` in an ordered stage table. The first matching range wins.
///
/// Bounded ranges contain `start <= age < end`. An open-ended range matches
/// any `age >= start` at 100%. Ages no range covers report `mature`/100.
pub fn stage_for(stages: &[GrowthStage], age: i64) -> StageProgress {
    // ---
    for stage in stages {
        let start = i64::from(stage.start);
        match stage.end.map(i64::from) {
            None if age >= start => return StageProgress::new(&stage.name, 100),
            Some(end) if start <= age && age < end => {
                let pct = (age - start) * 100 / (end - start);
                return StageProgress::new(&stage.name, pct.clamp(0, 100) as u8);
            }
            _ => {}
        }
    }
    StageProgress::new("mature", 100)
}

/// Human-readable care notes for one plant.
pub fn care_advice(profile: &HerbProfile, age: i64, temp_c: Option<f64>) -> Vec<String> {
    // ---
    let stage = stage_for(&profile.growth_stages, age).stage;
    let [germ_lo, germ_hi] = profile.germination_days.map(i64::from);
    let mut advice = Vec::new();

    if age < germ_lo {
        advice.push(format!(
            "Seeds planted {age} days ago. Germination expected in {germ_lo}-{germ_hi} days."
        ));
    } else if age < germ_hi && stage == "sprout" {
        advice.push(format!(
            "Within germination window ({germ_lo}-{germ_hi} days). Be patient."
        ));
    }

    match stage.as_str() {
        "mature" => advice.push(format!("Ready to harvest! {}", profile.harvest_tips)),
        "vegetative" => {
            let remaining = (i64::from(profile.days_to_harvest[0]) - age).max(0);
            if remaining > 0 {
                advice.push(format!(
                    "Growing well. Approximately {remaining} days to first harvest."
                ));
            } else {
                advice.push("Approaching harvest time. Watch for mature leaf size.".to_string());
            }
        }
        _ => {}
    }

    if let Some(temp) = temp_c {
        if temp < profile.temp_min_c {
            advice.push(format!(
                "WARNING: Water temp {temp}C is below minimum {}C for {}.",
                profile.temp_min_c, profile.display_name
            ));
        } else if temp > profile.temp_max_c {
            advice.push(format!(
                "WARNING: Water temp {temp}C exceeds maximum {}C for {}.",
                profile.temp_max_c, profile.display_name
            ));
        }
    }
    advice
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionWarning {
    pub plant: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
}

/// Temperature warnings for every plant whose species range excludes the reading.
pub fn check_conditions(
    plants: &[Plant],
    herbs: &HerbLibrary,
    sensors: &SensorSnapshot,
) -> Vec<ConditionWarning> {
    // ---
    let Some(temp) = sensors.temp_c else {
        return Vec::new();
    };
    plants
        .iter()
        .filter_map(|plant| {
            let profile = herbs.get(&plant.species)?;
            let message = if temp < profile.temp_min_c {
                format!(
                    "Water temperature ({temp}C) too cold for {} (min {}C)",
                    plant.name, profile.temp_min_c
                )
            } else if temp > profile.temp_max_c {
                format!(
                    "Water temperature ({temp}C) too warm for {} (max {}C)",
                    plant.name, profile.temp_max_c
                )
            } else {
                return None;
            };
            Some(ConditionWarning {
                plant: plant.name.clone(),
                kind: "temp",
                message,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn stages() -> Vec<GrowthStage> {
        // ---
        let stage = |name: &str, start, end| GrowthStage {
            name: name.into(),
            start,
            end,
        };
        vec![
            stage("sprout", 0, Some(10)),
            stage("seedling", 10, Some(25)),
            stage("vegetative", 25, Some(60)),
            stage("mature", 60, None),
        ]
    }

    fn plant(name: &str, species: &str) -> Plant {
        Plant {
            name: name.into(),
            species: species.into(),
            planted_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            position: "left".into(),
        }
    }

    #[test]
    fn test_embedded_table_loads() {
        // ---
        let herbs = HerbLibrary::embedded().unwrap();
        assert!(!herbs.is_empty());
        let basil = herbs.get("basil").unwrap();
        assert_eq!(basil.scientific_name, "Ocimum basilicum");
        assert_eq!(basil.growth_stages.last().unwrap().end, None);
    }

    #[test]
    fn test_stage_boundaries() {
        // ---
        let table = stages();
        assert_eq!(stage_for(&table, 0), StageProgress::new("sprout", 0));
        assert_eq!(stage_for(&table, 9), StageProgress::new("sprout", 90));
        assert_eq!(stage_for(&table, 10), StageProgress::new("seedling", 0));
        assert_eq!(stage_for(&table, 17), StageProgress::new("seedling", 46));
        assert_eq!(stage_for(&table, 59), StageProgress::new("vegetative", 97));
        assert_eq!(stage_for(&table, 60), StageProgress::new("mature", 100));
        assert_eq!(stage_for(&table, 400), StageProgress::new("mature", 100));
    }

    #[test]
    fn test_stage_every_age_lands_in_exactly_one_range() {
        // ---
        let table = stages();
        for age in 0..200 {
            let found = stage_for(&table, age);
            let containing: Vec<&GrowthStage> = table
                .iter()
                .filter(|s| {
                    let start = i64::from(s.start);
                    match s.end {
                        Some(end) => start <= age && age < i64::from(end),
                        None => age >= start,
                    }
                })
                .collect();
            assert_eq!(containing.len(), 1, "age {age}");
            assert_eq!(found.stage, containing[0].name);
            assert!(found.progress <= 100);
        }
    }

    #[test]
    fn test_stage_fallbacks() {
        // ---
        let herbs = HerbLibrary::embedded().unwrap();
        assert_eq!(
            herbs.growth_stage("venus-flytrap", 12),
            StageProgress::new("unknown", 0)
        );

        // Gap in the table and a future planting date both fall through.
        let gappy = vec![GrowthStage {
            name: "seedling".into(),
            start: 5,
            end: Some(10),
        }];
        assert_eq!(stage_for(&gappy, 2), StageProgress::new("mature", 100));
        assert_eq!(stage_for(&gappy, -3), StageProgress::new("mature", 100));
    }

    #[test]
    fn test_plant_age() {
        // ---
        let planted = NaiveDate::from_ymd_opt(2026, 1, 20).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 2, 8).unwrap();
        assert_eq!(plant_age(planted, today), 19);
        assert_eq!(plant_age(today, planted), -19);
    }

    #[test]
    fn test_care_advice_by_stage() {
        // ---
        let herbs = HerbLibrary::embedded().unwrap();
        let basil = herbs.get("basil").unwrap();

        let early = care_advice(basil, 3, None);
        assert!(early[0].starts_with("Seeds planted 3 days ago"));

        let growing = care_advice(basil, 40, Some(22.0));
        assert_eq!(
            growing,
            vec!["Growing well. Approximately 20 days to first harvest.".to_string()]
        );

        let ready = care_advice(basil, 75, Some(12.5));
        assert!(ready[0].starts_with("Ready to harvest!"));
        assert_eq!(
            ready[1],
            "WARNING: Water temp 12.5C is below minimum 18C for Sweet Basil."
        );
    }

    #[test]
    fn test_check_conditions_flags_out_of_range() {
        // ---
        let herbs = HerbLibrary::embedded().unwrap();
        let plants = vec![plant("Basil", "basil"), plant("Mint", "mint"), plant("Fern", "fern")];

        let warm = SensorSnapshot {
            lux: None,
            temp_c: Some(28.0),
        };
        let warnings = check_conditions(&plants, &herbs, &warm);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].plant, "Mint");
        assert_eq!(
            warnings[0].message,
            "Water temperature (28C) too warm for Mint (max 27C)"
        );

        assert!(check_conditions(&plants, &herbs, &SensorSnapshot::default()).is_empty());
    }
}
