use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use serde::de::DeserializeOwned;

use crate::{error::ApiError, state::AppState};

pub mod admin;
pub mod auth;
pub mod bundles;
pub mod contact;
pub mod credits;
pub mod export;
pub mod grading;
pub mod health;
pub mod purchase;
pub mod upload;

pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/health", health::routes())
        .nest("/admin", admin::routes())
        .merge(auth::routes())
        .merge(bundles::routes())
        .merge(credits::routes())
        .merge(purchase::routes())
        .merge(grading::routes())
        .merge(upload::routes())
        .merge(export::routes())
        .merge(contact::routes())
}

/// Collects per-field validation messages for a request body.
#[derive(Debug, Default)]
pub(crate) struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn check(&mut self, valid: bool, field: &str, message: &str) -> &mut Self {
        if !valid && !self.0.contains_key(field) {
            self.0.insert(field.to_string(), message.to_string());
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), ApiError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation(std::mem::take(&mut self.0)))
        }
    }
}

/// `Json` body extractor whose rejections use the API error envelope.
/// Type mismatches become field errors keyed by the offending JSON path.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

const DATA_ERROR_PREFIX: &str = "into the target type: ";

fn json_rejection(rejection: JsonRejection) -> ApiError {
    let detail = rejection.body_text();
    match rejection {
        JsonRejection::JsonDataError(_) => {
            let (field, message) = data_error_field(&detail);
            ApiError::validation(BTreeMap::from([(field, message)]))
        }
        JsonRejection::JsonSyntaxError(_) => {
            ApiError::validation(BTreeMap::from([("body".to_string(), detail)]))
        }
        _ => ApiError::bad_request(detail),
    }
}

/// Splits `...into the target type: rubricId: invalid type: ...` into the
/// field path and the message. Errors without a path land on `body`.
fn data_error_field(detail: &str) -> (String, String) {
    let rest = detail
        .split_once(DATA_ERROR_PREFIX)
        .map_or(detail, |(_, rest)| rest);
    match rest.split_once(": ") {
        Some((path, message)) if !path.is_empty() && !path.contains(char::is_whitespace) => {
            (path.to_string(), message.to_string())
        }
        _ => ("body".to_string(), rest.to_string()),
    }
}

pub(crate) fn char_len(value: &str) -> usize {
    value.trim().chars().count()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !domain.ends_with('.'))
}
