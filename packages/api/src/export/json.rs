use chrono::NaiveDateTime;
use serde::Serialize;

use super::{ExportError, iso_timestamp, overall_score, parse_recommendations, parse_scores};
use crate::{
    entity::grading::{self, Scores},
    grading::{rubric, rubric_name},
};

pub const FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Serialize)]
pub struct JsonExport {
    pub export_info: ExportInfo,
    pub gradings: Vec<ExportedGrading>,
}

#[derive(Debug, Serialize)]
pub struct ExportInfo {
    pub generated_at: String,
    pub total_gradings: usize,
    pub format_version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ExportedGrading {
    pub id: i32,
    pub date: String,
    pub rubric: RubricInfo,
    pub essay: EssayInfo,
    pub assessment: Assessment,
}

#[derive(Debug, Serialize)]
pub struct RubricInfo {
    pub id: i32,
    pub name: String,
    pub criteria: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EssayInfo {
    pub length: usize,
    pub word_count: usize,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct Assessment {
    pub scores: Scores,
    pub overall_score: i64,
    pub feedback: String,
    pub recommendations: Vec<String>,
}

pub fn render(gradings: &[grading::Model], now: NaiveDateTime) -> Result<JsonExport, ExportError> {
    let gradings = gradings
        .iter()
        .map(export_grading)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(JsonExport {
        export_info: ExportInfo {
            generated_at: iso_timestamp(now),
            total_gradings: gradings.len(),
            format_version: FORMAT_VERSION,
        },
        gradings,
    })
}

fn export_grading(grading: &grading::Model) -> Result<ExportedGrading, ExportError> {
    let scores = parse_scores(grading)?;
    // Criteria of unknown rubrics fall back to whatever was scored.
    let criteria = match rubric(grading.rubric_id) {
        Some(r) => r.criteria.iter().map(|c| c.name.to_string()).collect(),
        None => scores.keys().cloned().collect(),
    };

    Ok(ExportedGrading {
        id: grading.id,
        date: iso_timestamp(grading.date),
        rubric: RubricInfo {
            id: grading.rubric_id,
            name: rubric_name(grading.rubric_id),
            criteria,
        },
        essay: EssayInfo {
            length: grading.essay_text.chars().count(),
            word_count: grading.essay_text.split_whitespace().count(),
            text: grading.essay_text.clone(),
        },
        assessment: Assessment {
            overall_score: overall_score(&scores),
            scores,
            feedback: grading.feedback.clone(),
            recommendations: parse_recommendations(grading)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures;

    #[test]
    fn test_scores_survive_export() {
        let grading = fixtures::grading(3, r#"{"Quality of Analysis":7,"Use of Examples":6}"#);
        let export = render(&[grading.clone()], fixtures::date()).unwrap();
        let text = serde_json::to_string(&export).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(
            parsed["gradings"][0]["assessment"]["scores"],
            serde_json::Value::Object(grading.parsed_scores().unwrap())
        );
        assert_eq!(parsed["gradings"][0]["assessment"]["overall_score"], 7);
        assert_eq!(parsed["export_info"]["total_gradings"], 1);
        assert_eq!(parsed["export_info"]["format_version"], "1.0");
        assert_eq!(parsed["gradings"][0]["rubric"]["name"], "TOK Essay");
        assert_eq!(
            parsed["gradings"][0]["rubric"]["criteria"]
                .as_array()
                .unwrap()
                .len(),
            5
        );
    }

    #[test]
    fn test_essay_statistics() {
        let mut grading = fixtures::grading(1, r#"{"A":5}"#);
        grading.essay_text = "one two  three\nfour".to_string();
        let export = render(&[grading], fixtures::date()).unwrap();
        assert_eq!(export.gradings[0].essay.word_count, 4);
        assert_eq!(export.gradings[0].essay.length, 19);
    }

    #[test]
    fn test_corrupt_scores_are_reported() {
        let grading = fixtures::grading(9, "not json");
        assert!(matches!(
            render(&[grading], fixtures::date()),
            Err(ExportError::CorruptGrading { id: 9, .. })
        ));
    }
}
