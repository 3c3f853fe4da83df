use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    entity::contact_message,
    error::ApiError,
    mail::{EmailMessage, templates::contact_notification},
    routes::{ApiJson, FieldErrors, char_len, is_valid_email},
    state::AppState,
};

pub const STATUS_UNREAD: &str = "unread";

pub fn routes() -> Router<AppState> {
    Router::new().route("/contact", post(submit_contact))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ContactRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ContactResponse {
    pub success: bool,
    pub id: i32,
}

#[utoipa::path(
    post,
    path = "/contact",
    tag = "contact",
    request_body = ContactRequest,
    responses(
        (status = 201, description = "Message stored", body = ContactResponse),
        (status = 400, description = "Validation failed")
    )
)]
#[tracing::instrument(name = "POST /contact", skip(state, request))]
pub async fn submit_contact(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ContactRequest>,
) -> Result<(StatusCode, Json<ContactResponse>), ApiError> {
    FieldErrors::default()
        .check(char_len(&request.name) >= 2, "name", "Name must be at least 2 characters")
        .check(is_valid_email(&request.email), "email", "Invalid email address")
        .check(
            char_len(&request.subject) >= 5,
            "subject",
            "Subject must be at least 5 characters",
        )
        .check(
            char_len(&request.message) >= 10,
            "message",
            "Message must be at least 10 characters",
        )
        .finish()?;

    let stored = contact_message::ActiveModel {
        name: Set(request.name.trim().to_string()),
        email: Set(request.email.trim().to_string()),
        subject: Set(request.subject.trim().to_string()),
        message: Set(request.message.trim().to_string()),
        status: Set(STATUS_UNREAD.to_string()),
        date: Set(chrono::Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;
    tracing::info!(id = stored.id, "Contact message stored");

    notify_inbox(&state, &stored).await;

    Ok((
        StatusCode::CREATED,
        Json(ContactResponse {
            success: true,
            id: stored.id,
        }),
    ))
}

/// Mail failures are logged only; the message is already stored.
async fn notify_inbox(state: &AppState, message: &contact_message::Model) {
    let (Some(client), Some(smtp)) = (&state.mail_client, &state.config.smtp) else {
        return;
    };

    let (subject, html, text) = contact_notification(message);
    let email = EmailMessage {
        to: smtp.notify_email.clone(),
        subject,
        body_html: Some(html),
        body_text: Some(text),
    };
    if let Err(e) = client.send(email).await {
        tracing::warn!(id = message.id, "Failed to send contact notification: {}", e);
    }
}
