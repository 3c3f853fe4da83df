use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sea_orm::EntityTrait;

use crate::{entity::user, error::ApiError, session::token_from_headers, state::AppState};

/// Caller identity resolved from the session cookie or bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppUser {
    Session { user_id: i32 },
    Anonymous,
}

impl AppUser {
    pub fn user_id(&self) -> Result<i32, ApiError> {
        match self {
            AppUser::Session { user_id } => Ok(*user_id),
            AppUser::Anonymous => Err(ApiError::unauthorized("Not authenticated")),
        }
    }

    /// Loads the signed-in user, failing with 401 for anonymous callers and
    /// for sessions whose user no longer exists.
    pub async fn require(&self, state: &AppState) -> Result<user::Model, ApiError> {
        let user_id = self.user_id()?;
        user::Entity::find_by_id(user_id)
            .one(&state.db)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Not authenticated"))
    }

    pub async fn require_admin(&self, state: &AppState) -> Result<user::Model, ApiError> {
        let user = self.require(state).await?;
        if !user.is_admin {
            return Err(ApiError::forbidden("Admin access required"));
        }
        Ok(user)
    }
}

/// Inserts an [`AppUser`] into every request. An invalid or expired token
/// leaves the caller anonymous so public routes keep working.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let user = match token_from_headers(request.headers()) {
        Some(token) => match state.session_keys.verify(&token) {
            Ok(user_id) => AppUser::Session { user_id },
            Err(e) => {
                tracing::debug!("Ignoring session token: {}", e);
                AppUser::Anonymous
            }
        },
        None => AppUser::Anonymous,
    };

    request.extensions_mut().insert(user);
    next.run(request).await
}
