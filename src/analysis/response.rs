//! Decoding of the vision service's reply into an [`AnalysisReport`].

use crate::models::AnalysisReport;

use super::AnalysisError;

// ---

const FENCE: &str = "```";

/// Drop a surrounding Markdown code fence, if present.
///
/// When the trimmed text starts with a fence marker, its first and last
/// lines are removed; otherwise the text is returned trimmed.
pub fn strip_code_fence(text: &str) -> String {
    // ---
    let trimmed = text.trim();
    if !trimmed.starts_with(FENCE) {
        return trimmed.to_string();
    }
    let lines: Vec<&str> = trimmed.lines().collect();
    if lines.len() < 2 {
        return String::new();
    }
    lines[1..lines.len() - 1].join("\n")
}

pub fn parse_report(text: &str) -> Result<AnalysisReport, AnalysisError> {
    Ok(serde_json::from_str(&strip_code_fence(text))?)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    const BODY: &str = r#"{"plants":[{"name":"Basil","observed_stage":"seedling","health_score":4,"days_to_harvest":30}],"overall_health":4,"summary":"Looking good","alerts":[]}"#;

    #[test]
    fn test_plain_json_parses() {
        // ---
        let report = parse_report(BODY).unwrap();
        assert_eq!(report.overall_health, Some(4));
        assert_eq!(report.plants[0].observed_stage, "seedling");
    }

    #[test]
    fn test_fenced_json_parses() {
        // ---
        let fenced = format!("\n```json\n{BODY}\n```\n");
        let report = parse_report(&fenced).unwrap();
        assert_eq!(report.summary, "Looking good");
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        // ---
        let err = parse_report("I could not see any plants.").unwrap_err();
        assert!(matches!(err, AnalysisError::Parse(_)));
        assert!(parse_report("```").is_err());
    }

    #[test]
    fn test_fractional_and_null_scores_are_tolerated() {
        // ---
        let body = r#"{"plants":[{"name":"Basil","health_score":4.5},{"name":"Mint","health_score":null},{"name":"Dill","health_score":9}],"overall_health":null,"summary":"Mixed"}"#;
        let report = parse_report(body).unwrap();

        assert_eq!(report.plants[0].health_score, 5);
        assert_eq!(report.plants[1].health_score, 0);
        assert_eq!(report.plants[2].health_score, 5);
        assert_eq!(report.overall_health, None);

        let rounded = parse_report(r#"{"overall_health":3.2}"#).unwrap();
        assert_eq!(rounded.overall_health, Some(3));
    }
}
