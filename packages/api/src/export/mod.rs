//! Renderers for exporting stored gradings as CSV, JSON or PDF.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use thiserror::Error;

use crate::entity::grading::Scores;

pub mod csv;
pub mod json;
pub mod pdf;

pub use pdf::{GotenbergRenderer, PdfRenderer};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unsupported export format `{0}`")]
    UnknownFormat(String),
    #[error("stored grading {id} is corrupt: {source}")]
    CorruptGrading {
        id: i32,
        #[source]
        source: serde_json::Error,
    },
    #[error("csv: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("csv output: {0}")]
    CsvOutput(String),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("pdf renderer request failed: {0}")]
    Renderer(#[from] reqwest::Error),
    #[error("pdf renderer returned {status}: {body}")]
    RendererStatus { status: u16, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Pdf,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
            ExportFormat::Pdf => "application/pdf",
        }
    }

    /// `corestone-gradings-YYYY-MM-DD.{ext}`
    pub fn filename(self, date: NaiveDate) -> String {
        format!(
            "corestone-gradings-{}.{}",
            date.format("%Y-%m-%d"),
            self.extension()
        )
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "pdf" => Ok(ExportFormat::Pdf),
            _ => Err(ExportError::UnknownFormat(s.to_string())),
        }
    }
}

/// Rounded mean of the numeric score values, `0` when there are none.
pub fn overall_score(scores: &Scores) -> i64 {
    let values: Vec<f64> = scores.values().filter_map(Value::as_f64).collect();
    if values.is_empty() {
        return 0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    mean.round() as i64
}

pub(crate) fn iso_timestamp(date: NaiveDateTime) -> String {
    date.and_utc().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub(crate) fn score_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub(crate) fn parse_scores(grading: &crate::entity::grading::Model) -> Result<Scores, ExportError> {
    grading
        .parsed_scores()
        .map_err(|source| ExportError::CorruptGrading {
            id: grading.id,
            source,
        })
}

pub(crate) fn parse_recommendations(
    grading: &crate::entity::grading::Model,
) -> Result<Vec<String>, ExportError> {
    grading
        .parsed_recommendations()
        .map_err(|source| ExportError::CorruptGrading {
            id: grading.id,
            source,
        })
}
