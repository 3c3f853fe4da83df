use axum::{
    Extension, Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    routing::post,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::ApiError,
    middleware::session::AppUser,
    state::AppState,
    upload::{DocumentKind, MAX_UPLOAD_BYTES, extract_text},
};

pub const FILE_FIELD: &str = "essayFile";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/upload-essay", post(upload_essay))
        // Room for the multipart framing around a maximum size file.
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub text: String,
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::bad_request(format!("Invalid upload: {}", err.body_text()))
}

#[utoipa::path(
    post,
    path = "/upload-essay",
    tag = "grading",
    request_body(content_type = "multipart/form-data", description = "Field `essayFile`: a PDF, DOCX or TXT file up to 5 MiB"),
    responses(
        (status = 200, description = "Extracted essay text", body = UploadResponse),
        (status = 400, description = "Missing file, unsupported extension or file too large"),
        (status = 401, description = "Not authenticated"),
        (status = 500, description = "Text extraction failed")
    )
)]
#[tracing::instrument(name = "POST /upload-essay", skip(state, user, multipart))]
pub async fn upload_essay(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    user.require(&state).await?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        // Rejected before any byte of the body is inspected.
        let kind = DocumentKind::from_filename(&filename)?;

        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(ApiError::bad_request("File too large. Maximum size is 5MB."));
        }

        tracing::debug!(?kind, size = bytes.len(), "Extracting uploaded essay");
        let text = extract_text(kind, bytes.to_vec()).await?;
        return Ok(Json(UploadResponse {
            success: true,
            text,
        }));
    }

    Err(ApiError::bad_request("No file uploaded"))
}
