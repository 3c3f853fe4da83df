use axum::{Extension, Json, Router, extract::State, routing::get};
use chrono::NaiveDateTime;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{entity::user, error::ApiError, middleware::session::AppUser, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/credits", get(get_credits))
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreditsResponse {
    pub credits: i32,
    pub subscription_expires_at: Option<NaiveDateTime>,
}

impl From<&user::Model> for CreditsResponse {
    fn from(user: &user::Model) -> Self {
        Self {
            credits: user.credits,
            subscription_expires_at: user.subscription_expires_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/credits",
    tag = "billing",
    responses(
        (status = 200, description = "Credit balance and subscription expiry", body = CreditsResponse),
        (status = 401, description = "Not authenticated")
    )
)]
#[tracing::instrument(name = "GET /credits", skip(state, user))]
pub async fn get_credits(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
) -> Result<Json<CreditsResponse>, ApiError> {
    let user = user.require(&state).await?;
    Ok(Json(CreditsResponse::from(&user)))
}
