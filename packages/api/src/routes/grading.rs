use axum::{
    Extension, Json, Router,
    extract::State,
    routing::{get, post},
};
use chrono::NaiveDateTime;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    credits::{self, Charge},
    entity::grading::{self, Scores},
    error::ApiError,
    export::overall_score,
    grading::{GradingError, GradingResult, RUBRICS, rubric, rubric_name},
    middleware::session::AppUser,
    routes::{ApiJson, FieldErrors, char_len},
    state::AppState,
};

pub const MIN_ESSAY_CHARS: usize = 50;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/rubrics", get(list_rubrics))
        .route("/grade", post(grade_essay))
        .route("/gradings", get(list_gradings))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RubricInfo {
    pub id: i32,
    pub name: String,
    pub criteria: Vec<CriterionInfo>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CriterionInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequest {
    #[serde(default)]
    pub essay_text: String,
    pub rubric_id: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GradingRecord {
    pub id: i32,
    pub essay_text: String,
    pub rubric_id: i32,
    pub rubric_name: String,
    #[schema(value_type = Object)]
    pub scores: Scores,
    pub overall_score: i64,
    pub feedback: String,
    pub recommendations: Vec<String>,
    pub date: NaiveDateTime,
}

impl TryFrom<grading::Model> for GradingRecord {
    type Error = ApiError;

    fn try_from(model: grading::Model) -> Result<Self, Self::Error> {
        let corrupt = |e: serde_json::Error| {
            ApiError::internal(format!("Stored grading {} is corrupt: {}", model.id, e))
        };
        let scores = model.parsed_scores().map_err(corrupt)?;
        let recommendations = model.parsed_recommendations().map_err(corrupt)?;
        Ok(Self {
            id: model.id,
            rubric_name: rubric_name(model.rubric_id),
            overall_score: overall_score(&scores),
            scores,
            recommendations,
            essay_text: model.essay_text,
            rubric_id: model.rubric_id,
            feedback: model.feedback,
            date: model.date,
        })
    }
}

#[utoipa::path(
    get,
    path = "/rubrics",
    tag = "grading",
    responses((status = 200, description = "The fixed rubric catalog", body = Vec<RubricInfo>))
)]
#[tracing::instrument(name = "GET /rubrics")]
pub async fn list_rubrics() -> Json<Vec<RubricInfo>> {
    Json(
        RUBRICS
            .iter()
            .map(|r| RubricInfo {
                id: r.id,
                name: r.name.to_string(),
                criteria: r
                    .criteria
                    .iter()
                    .map(|c| CriterionInfo {
                        name: c.name.to_string(),
                        description: c.description.to_string(),
                    })
                    .collect(),
            })
            .collect(),
    )
}

#[utoipa::path(
    post,
    path = "/grade",
    tag = "grading",
    request_body = GradeRequest,
    responses(
        (status = 200, description = "Essay graded and stored", body = GradingResult),
        (status = 400, description = "Validation failed or unknown rubric"),
        (status = 401, description = "Not authenticated"),
        (status = 402, description = "Insufficient credits"),
        (status = 500, description = "Grading failed; any debited credit is refunded")
    )
)]
#[tracing::instrument(name = "POST /grade", skip(state, user, request), fields(rubric_id = ?request.rubric_id))]
pub async fn grade_essay(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    ApiJson(request): ApiJson<GradeRequest>,
) -> Result<Json<GradingResult>, ApiError> {
    let user = user.require(&state).await?;

    FieldErrors::default()
        .check(
            char_len(&request.essay_text) >= MIN_ESSAY_CHARS,
            "essayText",
            "Essay must be at least 50 characters",
        )
        .check(request.rubric_id.is_some(), "rubricId", "A rubric is required")
        .finish()?;
    let rubric_id = request.rubric_id.unwrap_or_default();
    let rubric = rubric(rubric_id).ok_or(GradingError::UnknownRubric(rubric_id))?;

    let now = chrono::Utc::now().naive_utc();
    let charge = credits::authorize_grading(&state.db, &user, now).await?;

    let result = match state.grader.grade(rubric, &request.essay_text).await {
        Ok(result) => result,
        Err(e) => {
            refund_after_failure(&state, user.id, charge).await;
            return Err(e.into());
        }
    };

    if let Err(e) = store_grading(&state, user.id, rubric_id, &request.essay_text, &result, now).await
    {
        refund_after_failure(&state, user.id, charge).await;
        return Err(e);
    }

    metrics::counter!("gradings_total", "rubric" => rubric.slug).increment(1);
    tracing::info!(
        user_id = user.id,
        overall = result.overall_score,
        subscription = matches!(charge, Charge::Subscription),
        "Essay graded"
    );
    Ok(Json(result))
}

async fn store_grading(
    state: &AppState,
    user_id: i32,
    rubric_id: i32,
    essay_text: &str,
    result: &GradingResult,
    now: NaiveDateTime,
) -> Result<grading::Model, ApiError> {
    let stored = grading::ActiveModel {
        user_id: Set(user_id),
        essay_text: Set(essay_text.to_string()),
        rubric_id: Set(rubric_id),
        scores: Set(serde_json::to_string(&result.scores)?),
        feedback: Set(result.feedback.clone()),
        recommendations: Set(serde_json::to_string(&result.recommendations)?),
        date: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;
    Ok(stored)
}

async fn refund_after_failure(state: &AppState, user_id: i32, charge: Charge) {
    if let Err(e) = credits::refund(&state.db, user_id, charge).await {
        tracing::error!(user_id, "Failed to refund credit: {}", e);
    }
}

#[utoipa::path(
    get,
    path = "/gradings",
    tag = "grading",
    responses(
        (status = 200, description = "Own gradings, newest first", body = Vec<GradingRecord>),
        (status = 401, description = "Not authenticated")
    )
)]
#[tracing::instrument(name = "GET /gradings", skip(state, user))]
pub async fn list_gradings(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
) -> Result<Json<Vec<GradingRecord>>, ApiError> {
    let user_id = user.user_id()?;
    let gradings = grading::Entity::find()
        .filter(grading::Column::UserId.eq(user_id))
        .order_by_desc(grading::Column::Date)
        .order_by_desc(grading::Column::Id)
        .all(&state.db)
        .await?;

    let records = gradings
        .into_iter()
        .map(GradingRecord::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(records))
}
