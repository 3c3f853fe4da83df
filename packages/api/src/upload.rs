//! Plain-text extraction from uploaded essays.

use std::io::{Cursor, Read};

use regex::Regex;
use thiserror::Error;

/// Upload size limit for `POST /api/upload-essay`.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported file extension `{0}`")]
    UnsupportedExtension(String),
    #[error("pdf: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("docx archive: {0}")]
    DocxArchive(#[from] zip::result::ZipError),
    #[error("docx body: {0}")]
    DocxBody(#[from] std::io::Error),
    #[error("docx pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ExtractionError {
    /// Message safe to show to the uploader.
    pub fn public_message(&self) -> &'static str {
        match self {
            ExtractionError::UnsupportedExtension(_) => {
                "Invalid file format. Only PDF, DOCX, and TXT files are allowed."
            }
            ExtractionError::Pdf(_) => "Failed to extract text from PDF",
            ExtractionError::DocxArchive(_)
            | ExtractionError::DocxBody(_)
            | ExtractionError::Pattern(_) => "Failed to extract text from DOCX",
            ExtractionError::Task(_) => "Failed to process file",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Txt,
}

impl DocumentKind {
    /// Decides the format from the file extension alone, case-insensitively.
    pub fn from_filename(filename: &str) -> Result<Self, ExtractionError> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "pdf" => Ok(DocumentKind::Pdf),
            "docx" => Ok(DocumentKind::Docx),
            "txt" => Ok(DocumentKind::Txt),
            _ => Err(ExtractionError::UnsupportedExtension(extension)),
        }
    }
}

/// Extracts the trimmed text of an upload on the blocking pool.
pub async fn extract_text(kind: DocumentKind, bytes: Vec<u8>) -> Result<String, ExtractionError> {
    tokio::task::spawn_blocking(move || extract(kind, &bytes)).await?
}

pub fn extract(kind: DocumentKind, bytes: &[u8]) -> Result<String, ExtractionError> {
    let text = match kind {
        DocumentKind::Pdf => extract_pdf(bytes)?,
        DocumentKind::Docx => extract_docx(bytes)?,
        DocumentKind::Txt => String::from_utf8_lossy(bytes).into_owned(),
    };
    Ok(text.trim().to_string())
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    let document = lopdf::Document::load_mem(bytes)?;
    let pages: Vec<u32> = document.get_pages().keys().copied().collect();
    if pages.is_empty() {
        return Ok(String::new());
    }
    Ok(document.extract_text(&pages)?)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")?
        .read_to_string(&mut xml)?;
    document_xml_text(&xml)
}

/// One line per `<w:p>` paragraph, concatenating its `<w:t>` runs.
fn document_xml_text(xml: &str) -> Result<String, ExtractionError> {
    let paragraph = Regex::new(r"(?s)<w:p[\s>].*?</w:p>")?;
    let run = Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:tab/>|<w:br/>")?;

    let lines: Vec<String> = paragraph
        .find_iter(xml)
        .map(|p| {
            run.captures_iter(p.as_str())
                .map(|c| match c.get(1) {
                    Some(text) => unescape_xml(text.as_str()),
                    None if c[0].starts_with("<w:tab") => "\t".to_string(),
                    None => "\n".to_string(),
                })
                .collect::<String>()
        })
        .collect();
    Ok(lines.join("\n"))
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
