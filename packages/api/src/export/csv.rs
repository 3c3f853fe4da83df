use csv::{QuoteStyle, WriterBuilder};

use super::{ExportError, overall_score, parse_recommendations, parse_scores, score_text};
use crate::{entity::grading, grading::rubric_name};

const FIXED_COLUMNS: [&str; 7] = [
    "id",
    "date",
    "rubric",
    "overall_score",
    "essay_length",
    "feedback_summary",
    "recommendations_count",
];

const SUMMARY_CHARS: usize = 100;

/// One row per grading. Criterion columns are the union of all criteria in
/// the order they are first seen; a grading without a criterion leaves the
/// cell empty.
pub fn render(gradings: &[grading::Model]) -> Result<String, ExportError> {
    let mut parsed = Vec::with_capacity(gradings.len());
    let mut criteria: Vec<String> = Vec::new();
    for grading in gradings {
        let scores = parse_scores(grading)?;
        for name in scores.keys() {
            if !criteria.contains(name) {
                criteria.push(name.clone());
            }
        }
        let recommendations = parse_recommendations(grading)?;
        parsed.push((grading, scores, recommendations.len()));
    }

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(vec![]);

    let mut header: Vec<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.extend(criteria.iter().cloned());
    harden_fields(&mut header);
    writer.write_record(&header)?;

    for (grading, scores, recommendation_count) in parsed {
        let mut row = vec![
            grading.id.to_string(),
            grading.date.format("%Y-%m-%d").to_string(),
            rubric_name(grading.rubric_id),
            overall_score(&scores).to_string(),
            grading.essay_text.chars().count().to_string(),
            feedback_summary(&grading.feedback),
            recommendation_count.to_string(),
        ];
        row.extend(
            criteria
                .iter()
                .map(|name| scores.get(name).map(score_text).unwrap_or_default()),
        );
        harden_fields(&mut row);
        writer.write_record(&row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::CsvOutput(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ExportError::CsvOutput(e.to_string()))
}

fn feedback_summary(feedback: &str) -> String {
    let mut summary: String = feedback.chars().take(SUMMARY_CHARS).collect();
    summary.push_str("...");
    summary
}

/// Prefixes cells that a spreadsheet would evaluate as a formula.
fn harden_fields(fields: &mut [String]) {
    for field in fields {
        let Some(first) = field.trim_start().chars().next() else {
            continue;
        };
        let numeric = field.trim().parse::<f64>().is_ok();
        if matches!(first, '=' | '+' | '-' | '@') && !numeric {
            field.insert(0, '\'');
        }
    }
}
