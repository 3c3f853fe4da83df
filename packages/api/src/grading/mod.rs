//! Essay grading through an external chat-completion API.
//!
//! The crate only builds the rubric prompt and validates the JSON reply;
//! the assessment itself is done by the model.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

use crate::entity::grading::Scores;

mod openai;
pub mod rubric;

pub use openai::OpenAiGrader;
pub use rubric::{Criterion, RUBRICS, Rubric, rubric, rubric_name};

pub const MIN_SCORE: i64 = 1;
pub const MAX_SCORE: i64 = 10;

pub(crate) const SYSTEM_PROMPT: &str = "You are an experienced International Baccalaureate examiner. \
Provide detailed, constructive feedback that helps students improve their work, \
and always answer with a single JSON object.";

#[derive(Debug, Error)]
pub enum GradingError {
    #[error("unknown rubric id {0}")]
    UnknownRubric(i32),
    #[error("grading request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("grading API returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("grading reply is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("grading reply is missing or has an invalid `{0}` field")]
    InvalidField(&'static str),
    #[error("grading reply contained no message content")]
    EmptyReply,
}

/// The validated assessment returned to the client.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GradingResult {
    #[schema(value_type = Object)]
    pub scores: Scores,
    pub overall_score: i64,
    pub feedback: String,
    pub recommendations: Vec<String>,
}

#[async_trait::async_trait]
pub trait EssayGrader: Send + Sync {
    async fn grade(&self, rubric: &Rubric, essay: &str) -> Result<GradingResult, GradingError>;
}

pub fn build_prompt(rubric: &Rubric, essay: &str) -> String {
    let mut prompt = format!(
        "Grade the following submission using the \"{}\" rubric.\n\nRUBRIC CRITERIA:\n",
        rubric.name
    );
    for criterion in rubric.criteria {
        let _ = writeln!(prompt, "- {}: {}", criterion.name, criterion.description);
    }

    let score_lines = rubric
        .criteria
        .iter()
        .map(|c| format!("    \"{}\": [score from 1-10]", c.name))
        .collect::<Vec<_>>()
        .join(",\n");

    let _ = write!(
        prompt,
        r#"
SUBMISSION TO GRADE:
"""
{essay}
"""

Reply in the following JSON format:
{{
  "scores": {{
{score_lines}
  }},
  "overallScore": [overall score from 1-10],
  "feedback": "Detailed feedback explaining the strengths and areas for improvement",
  "recommendations": ["specific recommendation 1", "specific recommendation 2", "specific recommendation 3"]
}}

Be constructive and specific. Scores are integers from 1-10 where:
1-3: Needs significant improvement
4-6: Developing
7-8: Proficient
9-10: Excellent"#
    );
    prompt
}

/// Validates the model's JSON reply. All four top-level fields must be
/// present; the overall score is rounded and clamped into `[1, 10]`.
pub fn parse_grading_reply(content: &str) -> Result<GradingResult, GradingError> {
    let reply: Value = serde_json::from_str(content)?;

    let scores = reply
        .get("scores")
        .and_then(Value::as_object)
        .filter(|s| !s.is_empty() && s.values().all(Value::is_number))
        .cloned()
        .ok_or(GradingError::InvalidField("scores"))?;

    let overall = reply
        .get("overallScore")
        .and_then(Value::as_f64)
        .ok_or(GradingError::InvalidField("overallScore"))?;

    let feedback = reply
        .get("feedback")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .ok_or(GradingError::InvalidField("feedback"))?
        .to_string();

    let recommendations = match reply.get("recommendations") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(_) => Vec::new(),
        None => return Err(GradingError::InvalidField("recommendations")),
    };

    Ok(GradingResult {
        scores,
        overall_score: clamp_score(overall),
        feedback,
        recommendations,
    })
}

pub fn clamp_score(score: f64) -> i64 {
    (score.round() as i64).clamp(MIN_SCORE, MAX_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_every_criterion() {
        let rubric = rubric(1).unwrap();
        let prompt = build_prompt(rubric, "My essay text");
        assert!(prompt.contains("\"Extended Essay\""));
        for name in rubric.criterion_names() {
            assert!(prompt.contains(&format!("- {}:", name)));
            assert!(prompt.contains(&format!("\"{}\": [score from 1-10]", name)));
        }
        assert!(prompt.contains("My essay text"));
    }

    #[test]
    fn test_parse_valid_reply() {
        let reply = r#"{
            "scores": {"Focus and Method": 7, "Critical Thinking": 8},
            "overallScore": 7.6,
            "feedback": "Solid work.",
            "recommendations": ["Narrow the research question", 3, "Cite more sources"]
        }"#;
        let result = parse_grading_reply(reply).unwrap();
        assert_eq!(result.overall_score, 8);
        assert_eq!(
            result.scores.keys().collect::<Vec<_>>(),
            vec!["Focus and Method", "Critical Thinking"]
        );
        assert_eq!(
            result.recommendations,
            vec!["Narrow the research question", "Cite more sources"]
        );
    }

    #[test]
    fn test_overall_score_is_clamped() {
        let reply = |score: &str| {
            format!(
                r#"{{"scores": {{"A": 5}}, "overallScore": {score}, "feedback": "ok", "recommendations": []}}"#
            )
        };
        assert_eq!(parse_grading_reply(&reply("42")).unwrap().overall_score, 10);
        assert_eq!(parse_grading_reply(&reply("0")).unwrap().overall_score, 1);
        assert_eq!(parse_grading_reply(&reply("-3.2")).unwrap().overall_score, 1);
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        let cases = [
            (r#"{"overallScore": 5, "feedback": "x", "recommendations": []}"#, "scores"),
            (r#"{"scores": {"A": 5}, "feedback": "x", "recommendations": []}"#, "overallScore"),
            (r#"{"scores": {"A": 5}, "overallScore": 5, "recommendations": []}"#, "feedback"),
            (r#"{"scores": {"A": 5}, "overallScore": 5, "feedback": "x"}"#, "recommendations"),
            (r#"{"scores": {"A": "high"}, "overallScore": 5, "feedback": "x", "recommendations": []}"#, "scores"),
        ];
        for (reply, field) in cases {
            match parse_grading_reply(reply) {
                Err(GradingError::InvalidField(f)) => assert_eq!(f, field),
                other => panic!("expected InvalidField({field}), got {other:?}"),
            }
        }
    }

    #[test]
    fn test_non_json_reply() {
        assert!(matches!(
            parse_grading_reply("not json"),
            Err(GradingError::InvalidJson(_))
        ));
    }
}
