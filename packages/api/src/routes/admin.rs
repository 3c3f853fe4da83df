use axum::{Extension, Json, Router, extract::State, routing::get};
use sea_orm::{EntityTrait, QueryOrder};

use crate::{
    entity::contact_message, error::ApiError, middleware::session::AppUser, state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/contact-messages", get(list_contact_messages))
}

#[utoipa::path(
    get,
    path = "/admin/contact-messages",
    tag = "admin",
    responses(
        (status = 200, description = "All contact messages, newest first"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Admin access required")
    )
)]
#[tracing::instrument(name = "GET /admin/contact-messages", skip(state, user))]
pub async fn list_contact_messages(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
) -> Result<Json<Vec<contact_message::Model>>, ApiError> {
    user.require_admin(&state).await?;
    let messages = contact_message::Entity::find()
        .order_by_desc(contact_message::Column::Date)
        .order_by_desc(contact_message::Column::Id)
        .all(&state.db)
        .await?;
    Ok(Json(messages))
}
