use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::IntoResponse,
    routing::get,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    entity::grading,
    error::ApiError,
    export::{self, ExportFormat},
    middleware::session::AppUser,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/export/{format}", get(export_gradings))
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ExportQuery {
    /// Export only this grading
    pub grading_id: Option<i32>,
}

#[utoipa::path(
    get,
    path = "/export/{format}",
    tag = "export",
    params(
        ("format" = String, Path, description = "csv, json or pdf"),
        ExportQuery
    ),
    responses(
        (status = 200, description = "Attachment download of the caller's gradings"),
        (status = 400, description = "Unsupported format"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Grading not found or nothing to export")
    )
)]
#[tracing::instrument(name = "GET /export/{format}", skip(state, user))]
pub async fn export_gradings(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path(format): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user = user.require(&state).await?;
    let format: ExportFormat = format.parse()?;

    let mut select = grading::Entity::find().filter(grading::Column::UserId.eq(user.id));
    if let Some(grading_id) = query.grading_id {
        select = select.filter(grading::Column::Id.eq(grading_id));
    }
    let gradings = select
        .order_by_desc(grading::Column::Date)
        .order_by_desc(grading::Column::Id)
        .all(&state.db)
        .await?;

    if gradings.is_empty() {
        return Err(match query.grading_id {
            Some(_) => ApiError::not_found("Grading not found"),
            None => ApiError::not_found("No gradings to export"),
        });
    }

    let now = chrono::Utc::now().naive_utc();
    let body = match format {
        ExportFormat::Csv => export::csv::render(&gradings)?.into_bytes(),
        ExportFormat::Json => {
            serde_json::to_vec_pretty(&export::json::render(&gradings, now)?)
                .map_err(export::ExportError::from)?
        }
        ExportFormat::Pdf => {
            let html = export::pdf::render_html(&gradings, &user.username, now)?;
            state.pdf_renderer.render(html).await?
        }
    };

    tracing::info!(count = gradings.len(), format = format.extension(), "Exported gradings");
    let disposition = format!("attachment; filename=\"{}\"", format.filename(now.date()));
    Ok((
        [
            (CONTENT_TYPE, format.content_type().to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}
