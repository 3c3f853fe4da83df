use axum::{
    Extension, Json, Router,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::NaiveDateTime;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DbErr, EntityTrait, QueryFilter,
    SqlErr,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    credits::SIGNUP_CREDITS,
    entity::user,
    error::ApiError,
    middleware::session::AppUser,
    routes::{ApiJson, FieldErrors, char_len, is_valid_email},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/user", get(current_user))
        .route("/auth/google", post(google_auth))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub credits: i32,
    pub subscription_expires_at: Option<NaiveDateTime>,
    pub is_admin: bool,
    pub created_at: NaiveDateTime,
}

impl From<user::Model> for UserResponse {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            credits: user.credits,
            subscription_expires_at: user.subscription_expires_at,
            is_admin: user.is_admin,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Username or email address
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GoogleAuthRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub uid: String,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
    /// Firebase ID token; mandatory when federated verification is enabled
    #[serde(default)]
    pub id_token: Option<String>,
}

#[utoipa::path(
    post,
    path = "/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created and session started", body = UserResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Username or email already taken")
    )
)]
#[tracing::instrument(name = "POST /register", skip(state, request), fields(username = %request.username))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = request.username.trim().to_string();
    let email = request.email.trim().to_lowercase();
    FieldErrors::default()
        .check(
            (3..=32).contains(&char_len(&username)),
            "username",
            "Username must be between 3 and 32 characters",
        )
        .check(is_valid_email(&email), "email", "Invalid email address")
        .check(
            request.password.chars().count() >= 8,
            "password",
            "Password must be at least 8 characters",
        )
        .finish()?;

    let taken = user::Entity::find()
        .filter(
            Condition::any()
                .add(user::Column::Username.eq(&username))
                .add(user::Column::Email.eq(&email)),
        )
        .one(&state.db)
        .await?;
    if let Some(existing) = taken {
        return Err(if existing.username == username {
            ApiError::conflict("Username already exists")
        } else {
            ApiError::conflict("Email already registered")
        });
    }

    let password_hash = hash_password(request.password).await?;
    let now = chrono::Utc::now().naive_utc();
    let created = user::ActiveModel {
        username: Set(username),
        email: Set(email),
        password_hash: Set(Some(password_hash)),
        firebase_uid: Set(None),
        credits: Set(SIGNUP_CREDITS),
        subscription_expires_at: Set(None),
        is_admin: Set(false),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(|e| conflict_on_unique(e, "Username or email already registered"))?;

    tracing::info!(user_id = created.id, "Registered local account");
    let cookie = state.session_keys.cookie(&state.session_keys.sign(created.id, now)?);
    Ok((
        StatusCode::CREATED,
        [(SET_COOKIE, cookie)],
        Json(UserResponse::from(created)),
    ))
}

#[utoipa::path(
    post,
    path = "/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session started", body = UserResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
#[tracing::instrument(name = "POST /login", skip(state, request))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identifier = request.username.trim();
    let invalid = || ApiError::unauthorized("Invalid username or password");
    if identifier.is_empty() || request.password.is_empty() {
        return Err(invalid());
    }

    let found = user::Entity::find()
        .filter(
            Condition::any()
                .add(user::Column::Username.eq(identifier))
                .add(user::Column::Email.eq(identifier.to_lowercase())),
        )
        .one(&state.db)
        .await?
        .ok_or_else(invalid)?;

    // Federated accounts have no password to check against.
    let hash = found.password_hash.clone().ok_or_else(invalid)?;
    if !verify_password(request.password, hash).await? {
        return Err(invalid());
    }

    let now = chrono::Utc::now().naive_utc();
    let cookie = state.session_keys.cookie(&state.session_keys.sign(found.id, now)?);
    tracing::info!(user_id = found.id, "Logged in");
    Ok(([(SET_COOKIE, cookie)], Json(UserResponse::from(found))))
}

#[utoipa::path(
    post,
    path = "/logout",
    tag = "auth",
    responses((status = 204, description = "Session cookie cleared"))
)]
#[tracing::instrument(name = "POST /logout", skip(state))]
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(SET_COOKIE, state.session_keys.clear_cookie())],
    )
}

#[utoipa::path(
    get,
    path = "/user",
    tag = "auth",
    responses(
        (status = 200, description = "The signed-in user", body = UserResponse),
        (status = 401, description = "Not authenticated")
    )
)]
#[tracing::instrument(name = "GET /user", skip(state, user))]
pub async fn current_user(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
) -> Result<Json<UserResponse>, ApiError> {
    Ok(Json(user.require(&state).await?.into()))
}

#[utoipa::path(
    post,
    path = "/auth/google",
    tag = "auth",
    request_body = GoogleAuthRequest,
    responses(
        (status = 200, description = "Federated login, creating the account on first use", body = UserResponse),
        (status = 400, description = "Validation failed or the ID token has no email"),
        (status = 401, description = "ID token missing or invalid"),
        (status = 409, description = "Email belongs to an account this identity may not link to")
    )
)]
#[tracing::instrument(name = "POST /auth/google", skip(state, request))]
pub async fn google_auth(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<GoogleAuthRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = match &state.firebase {
        Some(verifier) => {
            let token = request
                .id_token
                .as_deref()
                .filter(|t| !t.is_empty())
                .ok_or_else(|| ApiError::unauthorized("Missing ID token"))?;
            let claims = verifier.verify(token).await?;
            // The posted email is never used once a token has been verified.
            let email = claims
                .email
                .ok_or_else(|| ApiError::bad_request("ID token carries no email address"))?;
            FederatedIdentity {
                uid: claims.sub,
                email: email.trim().to_lowercase(),
                email_verified: claims.email_verified,
            }
        }
        None => FederatedIdentity {
            uid: request.uid.trim().to_string(),
            email: request.email.trim().to_lowercase(),
            email_verified: true,
        },
    };

    FieldErrors::default()
        .check(!identity.uid.is_empty(), "uid", "Missing user id")
        .check(is_valid_email(&identity.email), "email", "Invalid email address")
        .finish()?;

    let now = chrono::Utc::now().naive_utc();
    let account =
        find_or_create_federated(&state, &identity, request.display_name.as_deref(), now).await?;

    let cookie = state.session_keys.cookie(&state.session_keys.sign(account.id, now)?);
    Ok(([(SET_COOKIE, cookie)], Json(UserResponse::from(account))))
}

struct FederatedIdentity {
    uid: String,
    email: String,
    email_verified: bool,
}

/// Looks the account up by uid, then links an existing account with the
/// same email when the provider vouches for that address, and otherwise
/// creates a new one.
async fn find_or_create_federated(
    state: &AppState,
    identity: &FederatedIdentity,
    display_name: Option<&str>,
    now: NaiveDateTime,
) -> Result<user::Model, ApiError> {
    let FederatedIdentity {
        uid,
        email,
        email_verified,
    } = identity;

    if let Some(existing) = user::Entity::find()
        .filter(user::Column::FirebaseUid.eq(uid.as_str()))
        .one(&state.db)
        .await?
    {
        return Ok(existing);
    }

    if let Some(existing) = user::Entity::find()
        .filter(user::Column::Email.eq(email.as_str()))
        .one(&state.db)
        .await?
    {
        if !email_verified || existing.firebase_uid.is_some() {
            tracing::warn!(user_id = existing.id, "Refusing to link unverified federated identity");
            return Err(ApiError::conflict("An account with this email already exists"));
        }
        tracing::info!(user_id = existing.id, "Linking federated identity to existing account");
        let mut active: user::ActiveModel = existing.into();
        active.firebase_uid = Set(Some(uid.clone()));
        return Ok(active.update(&state.db).await?);
    }

    let base = username_base(display_name, email);
    let username = available_username(state, &base).await?;
    let created = user::ActiveModel {
        username: Set(username),
        email: Set(email.clone()),
        password_hash: Set(None),
        firebase_uid: Set(Some(uid.clone())),
        credits: Set(SIGNUP_CREDITS),
        subscription_expires_at: Set(None),
        is_admin: Set(false),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(|e| conflict_on_unique(e, "Account already exists"))?;

    tracing::info!(user_id = created.id, "Created federated account");
    Ok(created)
}

fn username_base(display_name: Option<&str>, email: &str) -> String {
    let source = display_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default());
    let base: String = source
        .chars()
        .filter_map(|c| match c {
            c if c.is_alphanumeric() => Some(c.to_ascii_lowercase()),
            ' ' | '_' | '-' | '.' => Some('_'),
            _ => None,
        })
        .take(24)
        .collect();
    if base.chars().count() < 3 {
        "student".to_string()
    } else {
        base
    }
}

async fn available_username(state: &AppState, base: &str) -> Result<String, ApiError> {
    let mut candidate = base.to_string();
    for suffix in 1..=20 {
        let exists = user::Entity::find()
            .filter(user::Column::Username.eq(&candidate))
            .one(&state.db)
            .await?
            .is_some();
        if !exists {
            return Ok(candidate);
        }
        candidate = format!("{}_{}", base, suffix);
    }
    Ok(format!(
        "{}_{}",
        base,
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    ))
}

fn conflict_on_unique(err: DbErr, message: &str) -> ApiError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => ApiError::conflict(message),
        _ => err.into(),
    }
}

async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| ApiError::internal(format!("Password hashing task failed: {}", e)))?
        .map_err(|e| ApiError::internal(format!("Password hashing failed: {}", e)))
}

async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| ApiError::internal(format!("Password check task failed: {}", e)))?
        .map_err(|e| ApiError::internal(format!("Password check failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_base() {
        assert_eq!(username_base(Some("Ada Lovelace"), "x@y.z"), "ada_lovelace");
        assert_eq!(username_base(None, "ada.l@example.com"), "ada_l");
        assert_eq!(username_base(Some("  "), "a@example.com"), "student");
        assert_eq!(username_base(Some("Zoë!"), "z@example.com"), "zoë");
    }
}
