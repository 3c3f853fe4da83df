use std::{fmt::Write as _, time::Duration};

use chrono::NaiveDateTime;
use reqwest::{
    Client,
    multipart::{Form, Part},
};

use super::{ExportError, overall_score, parse_recommendations, parse_scores, score_text};
use crate::{entity::grading, grading::rubric_name};

const STYLE: &str = r#"
body { font-family: Helvetica, Arial, sans-serif; color: #1f2937; margin: 40px; }
.header { text-align: center; border-bottom: 3px solid #4f46e5; padding-bottom: 16px; margin-bottom: 32px; }
.header h1 { color: #4f46e5; margin: 0; font-size: 28px; }
.header h2 { margin: 8px 0 0; font-size: 18px; font-weight: 500; }
.meta { color: #6b7280; font-size: 13px; margin-top: 8px; }
.grading { page-break-inside: avoid; border: 1px solid #e5e7eb; border-radius: 8px; padding: 20px; margin-bottom: 24px; }
.grading h3 { margin: 0 0 4px; }
.overall { font-size: 22px; font-weight: 700; color: #4f46e5; }
table { width: 100%; border-collapse: collapse; margin: 12px 0; }
td { padding: 6px 8px; border-bottom: 1px solid #f3f4f6; }
td.score { text-align: right; font-weight: 600; width: 80px; }
.feedback { background: #f9fafb; padding: 12px; border-radius: 6px; white-space: pre-wrap; }
.footer { text-align: center; color: #9ca3af; font-size: 12px; margin-top: 40px; }
"#;

/// Converts an HTML document into PDF bytes.
#[async_trait::async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, html: String) -> Result<Vec<u8>, ExportError>;
}

/// Renderer backed by a Gotenberg compatible Chromium service.
pub struct GotenbergRenderer {
    client: Client,
    base_url: String,
}

impl GotenbergRenderer {
    pub fn new(base_url: &str) -> Result<Self, ExportError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl PdfRenderer for GotenbergRenderer {
    #[tracing::instrument(name = "GotenbergRenderer::render", skip(self, html), fields(html_len = html.len()))]
    async fn render(&self, html: String) -> Result<Vec<u8>, ExportError> {
        let page = Part::bytes(html.into_bytes())
            .file_name("index.html")
            .mime_str("text/html")?;
        let form = Form::new().part("files", page);

        let response = self
            .client
            .post(format!("{}/forms/chromium/convert/html", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExportError::RendererStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Builds the printable report. All user supplied text is escaped.
pub fn render_html(
    gradings: &[grading::Model],
    username: &str,
    now: NaiveDateTime,
) -> Result<String, ExportError> {
    let mut html = String::with_capacity(4096 * gradings.len().max(1));
    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>CorestoneGrader Report</title>
<style>{STYLE}</style>
</head>
<body>
<div class="header">
<h1>CorestoneGrader</h1>
<h2>Essay Grading Results Report</h2>
<div class="meta">Generated for: {user} &middot; Date: {date} &middot; Total Essays: {total}</div>
</div>
"#,
        user = escape_html(username),
        date = now.format("%B %-d, %Y"),
        total = gradings.len(),
    );

    for (index, grading) in gradings.iter().enumerate() {
        let scores = parse_scores(grading)?;
        let recommendations = parse_recommendations(grading)?;

        let _ = write!(
            html,
            r#"<div class="grading">
<h3>Essay {number}: {rubric}</h3>
<div class="meta">Graded on {date}</div>
<p>Overall Score: <span class="overall">{overall}/10</span></p>
<h4>Detailed Scores</h4>
<table>
"#,
            number = index + 1,
            rubric = escape_html(&rubric_name(grading.rubric_id)),
            date = grading.date.format("%B %-d, %Y"),
            overall = overall_score(&scores),
        );
        for (criterion, score) in &scores {
            let _ = writeln!(
                html,
                r#"<tr><td>{}</td><td class="score">{}/10</td></tr>"#,
                escape_html(criterion),
                escape_html(&score_text(score)),
            );
        }
        let _ = write!(
            html,
            "</table>\n<h4>Feedback</h4>\n<div class=\"feedback\">{}</div>\n",
            escape_html(&grading.feedback)
        );

        if !recommendations.is_empty() {
            html.push_str("<h4>Recommendations</h4>\n<ul>\n");
            for recommendation in &recommendations {
                let _ = writeln!(html, "<li>{}</li>", escape_html(recommendation));
            }
            html.push_str("</ul>\n");
        }
        html.push_str("</div>\n");
    }

    let _ = write!(
        html,
        r#"<div class="footer">Generated by CorestoneGrader on {}</div>
</body>
</html>
"#,
        now.format("%Y-%m-%d %H:%M UTC")
    );
    Ok(html)
}

pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
