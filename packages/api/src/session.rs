//! Signed session tokens and Firebase ID-token verification.
//!
//! A session is an HS256 JWT whose `sub` is the numeric user id. It travels
//! in the `corestone_session` cookie, or as a bearer token for API clients.

use std::time::Instant;

use axum::http::{
    HeaderMap,
    header::{AUTHORIZATION, COOKIE},
};
use chrono::{Duration, NaiveDateTime};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
    jwk::{AlgorithmParameters, JwkSet},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

pub const SESSION_COOKIE: &str = "corestone_session";
const ISSUER: &str = "corestone";

pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to sign session: {0}")]
    Signing(String),
    #[error("Invalid or expired session")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("Invalid session subject")]
    InvalidSubject,
    #[error("Invalid ID token: {0}")]
    InvalidIdToken(&'static str),
    #[error("Unknown signing key")]
    UnknownKey,
    #[error("Could not load identity provider keys: {0}")]
    KeyFetch(#[from] reqwest::Error),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    secure: bool,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_hours: i64, secure: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
            secure,
        }
    }

    pub fn sign(&self, user_id: i32, now: NaiveDateTime) -> Result<String, SessionError> {
        let issued_at = now.and_utc().timestamp();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            iss: ISSUER.to_string(),
            iat: issued_at,
            exp: issued_at + self.ttl.num_seconds(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| SessionError::Signing(e.to_string()))
    }

    /// Returns the user id of a valid, unexpired session token.
    pub fn verify(&self, token: &str) -> Result<i32, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        let data = decode::<SessionClaims>(token, &self.decoding, &validation)?;
        data.claims
            .sub
            .parse()
            .map_err(|_| SessionError::InvalidSubject)
    }

    pub fn cookie(&self, token: &str) -> String {
        format!(
            "{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}{}",
            self.ttl.num_seconds(),
            if self.secure { "; Secure" } else { "" }
        )
    }

    pub fn clear_cookie(&self) -> String {
        format!(
            "{SESSION_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0{}",
            if self.secure { "; Secure" } else { "" }
        )
    }
}

/// Bearer token first, then the session cookie.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.get(AUTHORIZATION)
        && let Ok(value) = auth.to_str()
        && let Some(token) = value.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[derive(Debug, Clone, Deserialize)]
pub struct FirebaseClaims {
    pub sub: String,
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    pub name: Option<String>,
}

/// Minimum time between two key-set downloads triggered by unknown `kid`s.
const JWKS_REFRESH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

struct KeyCache {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Verifies Firebase ID tokens against Google's secure-token keys. A token
/// naming an unknown `kid` refetches the key set, at most once per
/// [`JWKS_REFRESH_INTERVAL`].
pub struct FirebaseVerifier {
    project_id: String,
    jwks_url: String,
    cache: RwLock<KeyCache>,
    client: reqwest::Client,
}

impl FirebaseVerifier {
    pub async fn fetch(project_id: &str) -> Result<Self, SessionError> {
        let client = reqwest::Client::new();
        let keys = fetch_jwks(&client, FIREBASE_JWKS_URL).await?;
        tracing::info!(keys = keys.keys.len(), "Loaded Firebase signing keys");
        Ok(Self {
            project_id: project_id.to_string(),
            jwks_url: FIREBASE_JWKS_URL.to_string(),
            cache: RwLock::new(KeyCache {
                keys,
                fetched_at: Instant::now(),
            }),
            client,
        })
    }

    pub fn with_keys(project_id: &str, jwks_url: &str, keys: JwkSet) -> Self {
        Self {
            project_id: project_id.to_string(),
            jwks_url: jwks_url.to_string(),
            cache: RwLock::new(KeyCache {
                keys,
                fetched_at: Instant::now(),
            }),
            client: reqwest::Client::new(),
        }
    }

    #[tracing::instrument(name = "FirebaseVerifier::verify", skip_all)]
    pub async fn verify(&self, id_token: &str) -> Result<FirebaseClaims, SessionError> {
        let header = decode_header(id_token)?;
        if header.alg != Algorithm::RS256 {
            return Err(SessionError::InvalidIdToken("unexpected algorithm"));
        }
        let kid = header
            .kid
            .ok_or(SessionError::InvalidIdToken("missing kid"))?;

        // The read guard must be released before a refresh takes the write lock.
        let cached = decoding_key(&self.cache.read().await.keys, &kid)?;
        let key = match cached {
            Some(key) => key,
            None => self.refresh_for(&kid).await?,
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.project_id.as_str()]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", self.project_id)]);
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);

        let claims = decode::<FirebaseClaims>(id_token, &key, &validation)?.claims;
        if claims.sub.is_empty() {
            return Err(SessionError::InvalidIdToken("empty subject"));
        }
        Ok(claims)
    }

    /// Refetches the key set unless it was downloaded within the refresh
    /// interval. Concurrent callers wait on the write lock and then reuse
    /// the fresh set.
    async fn refresh_for(&self, kid: &str) -> Result<DecodingKey, SessionError> {
        let mut cache = self.cache.write().await;
        if let Some(key) = decoding_key(&cache.keys, kid)? {
            return Ok(key);
        }
        if cache.fetched_at.elapsed() < JWKS_REFRESH_INTERVAL {
            return Err(SessionError::UnknownKey);
        }

        tracing::debug!(%kid, "Unknown Firebase key id, refreshing key set");
        cache.fetched_at = Instant::now();
        cache.keys = fetch_jwks(&self.client, &self.jwks_url).await?;
        decoding_key(&cache.keys, kid)?.ok_or(SessionError::UnknownKey)
    }
}

fn decoding_key(keys: &JwkSet, kid: &str) -> Result<Option<DecodingKey>, SessionError> {
    let Some(jwk) = keys.find(kid) else {
        return Ok(None);
    };
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => Ok(Some(DecodingKey::from_rsa_components(&rsa.n, &rsa.e)?)),
        _ => Err(SessionError::InvalidIdToken("unsupported key type")),
    }
}

async fn fetch_jwks(client: &reqwest::Client, url: &str) -> Result<JwkSet, SessionError> {
    Ok(client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<JwkSet>()
        .await?)
}
