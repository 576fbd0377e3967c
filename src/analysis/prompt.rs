//! Text context sent alongside the photo.

use std::fmt::Write as _;

use chrono::NaiveDate;

use crate::models::{Plant, SensorSnapshot};

use super::{
    history::RecordSummary,
    knowledge::{self, HerbLibrary},
};

// ---

const DEFAULT_HARVEST_DAYS: [u32; 2] = [60, 90];

const INSTRUCTIONS: &str = r#"For each plant, provide:
1. Visible growth stage (sprout/seedling/vegetative/mature) based on what you see
2. Health score (1-5): 1=dead/dying, 2=poor, 3=fair, 4=good, 5=excellent
3. Specific observations (leaf color, size, any visible issues)
4. Any concerns or recommended actions
5. Estimated days until harvest-ready (or "ready now" if mature)

Also provide:
- Overall garden health score (1-5)
- A brief 1-2 sentence summary
- Any alerts that need immediate attention (empty list if none)

Respond in JSON format:
{
  "plants": [
    {
      "name": "Plant Name",
      "observed_stage": "seedling",
      "health_score": 4,
      "observations": "Description of what you see",
      "concerns": "Any issues or empty string",
      "days_to_harvest": 30
    }
  ],
  "overall_health": 4,
  "summary": "Brief overall assessment",
  "alerts": []
}"#;

/// One context line per plant: identity, position, age, stage and harvest window.
pub fn plant_line(plant: &Plant, herbs: &HerbLibrary, today: NaiveDate) -> String {
    // ---
    let age = knowledge::plant_age(plant.planted_date, today);
    let stage = herbs.growth_stage(&plant.species, age);
    let profile = herbs.get(&plant.species);
    let scientific = profile
        .map(|p| p.scientific_name.as_str())
        .unwrap_or(&plant.species);
    let [lo, hi] = profile
        .map(|p| p.days_to_harvest)
        .unwrap_or(DEFAULT_HARVEST_DAYS);

    format!(
        "- {} ({scientific}): {} position, {age} days old, {} stage ({}% through), \
         harvest expected at {lo}-{hi} days",
        plant.name, plant.position, stage.stage, stage.progress
    )
}

pub fn build_prompt(
    plants: &[Plant],
    herbs: &HerbLibrary,
    sensors: &SensorSnapshot,
    previous: Option<&RecordSummary>,
    today: NaiveDate,
) -> String {
    // ---
    let mut prompt = String::from(
        "You are analyzing an aquaponic herb garden (EcoGarden). \
         The photo shows the growing pod from an angled-above view.\n\nCurrent plants:\n",
    );
    for plant in plants {
        prompt.push_str(&plant_line(plant, herbs, today));
        prompt.push('\n');
    }

    prompt.push_str("\nCurrent sensor data:\n");
    let mut any_sensor = false;
    if let Some(temp) = sensors.temp_c {
        let _ = writeln!(prompt, "- Water temp: {temp}C");
        any_sensor = true;
    }
    if let Some(lux) = sensors.lux {
        let _ = writeln!(prompt, "- Light: {lux} lux");
        any_sensor = true;
    }
    if !any_sensor {
        prompt.push_str("- No sensor data available\n");
    }

    if let Some(prev) = previous.filter(|p| !p.summary.is_empty()) {
        let _ = write!(
            prompt,
            "\nPrevious analysis ({}):\n{}\nNote any changes since then.\n",
            prev.date.as_deref().unwrap_or("unknown"),
            prev.summary
        );
    }

    prompt.push('\n');
    prompt.push_str(INSTRUCTIONS);
    prompt
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 8).unwrap()
    }

    fn basil() -> Plant {
        Plant {
            name: "Basil".into(),
            species: "basil".into(),
            planted_date: NaiveDate::from_ymd_opt(2026, 1, 20).unwrap(),
            position: "front-left".into(),
        }
    }

    #[test]
    fn test_plant_line_uses_reference_data() {
        // ---
        let herbs = HerbLibrary::embedded().unwrap();
        assert_eq!(
            plant_line(&basil(), &herbs, today()),
            "- Basil (Ocimum basilicum): front-left position, 19 days old, seedling stage (60% through), harvest expected at 60-90 days"
        );
    }

    #[test]
    fn test_unknown_species_falls_back() {
        // ---
        let herbs = HerbLibrary::embedded().unwrap();
        let mut plant = basil();
        plant.species = "lovage".into();
        let line = plant_line(&plant, &herbs, today());
        assert!(line.contains("(lovage)"));
        assert!(line.contains("unknown stage (0% through)"));
        assert!(line.contains("60-90 days"));
    }

    #[test]
    fn test_prompt_sections() {
        // ---
        let herbs = HerbLibrary::embedded().unwrap();
        let sensors = SensorSnapshot {
            lux: None,
            temp_c: Some(21.5),
        };
        let previous = RecordSummary {
            date: Some("2026-02-07".into()),
            summary: "Basil leaves slightly pale.".into(),
            ..Default::default()
        };

        let prompt = build_prompt(&[basil()], &herbs, &sensors, Some(&previous), today());
        assert!(prompt.contains("- Water temp: 21.5C"));
        assert!(!prompt.contains("No sensor data"));
        assert!(prompt.contains("Previous analysis (2026-02-07):\nBasil leaves slightly pale."));
        assert!(prompt.ends_with("\"alerts\": []\n}"));
    }

    #[test]
    fn test_prompt_without_context() {
        // ---
        let herbs = HerbLibrary::embedded().unwrap();
        let empty_prev = RecordSummary::default();
        let prompt = build_prompt(
            &[],
            &herbs,
            &SensorSnapshot::default(),
            Some(&empty_prev),
            today(),
        );
        assert!(prompt.contains("- No sensor data available"));
        assert!(!prompt.contains("Previous analysis"));
    }
}
