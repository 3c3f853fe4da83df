use std::{env, str::FromStr};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    pub notify_email: String,
}

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub database_url: String,
    pub session_secret: String,
    pub session_ttl_hours: i64,
    pub cookie_secure: bool,
    pub openai_api_key: String,
    pub openai_endpoint: String,
    pub openai_model: String,
    pub pdf_renderer_url: String,
    pub stripe_secret_key: Option<String>,
    pub firebase_project_id: Option<String>,
    pub smtp: Option<SmtpConfig>,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let session_secret = required("SESSION_SECRET")?;
        if session_secret.len() < 32 {
            return Err(ConfigError::InvalidValue(
                "SESSION_SECRET",
                "must be at least 32 bytes".to_string(),
            ));
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            session_secret,
            session_ttl_hours: parsed("SESSION_TTL_HOURS", 168)?,
            cookie_secure: parsed("COOKIE_SECURE", true)?,
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_endpoint: env::var("OPENAI_ENDPOINT")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            pdf_renderer_url: env::var("PDF_RENDERER_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            stripe_secret_key: optional("STRIPE_SECRET_KEY"),
            firebase_project_id: optional("FIREBASE_PROJECT_ID"),
            smtp: SmtpConfig::from_env()?,
        })
    }
}

impl SmtpConfig {
    /// SMTP is enabled only when `SMTP_HOST` is present; the remaining
    /// variables are then mandatory.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(host) = optional("SMTP_HOST") else {
            return Ok(None);
        };

        Ok(Some(Self {
            host,
            port: parsed("SMTP_PORT", 587)?,
            username: required("SMTP_USERNAME")?,
            password: required("SMTP_PASSWORD")?,
            from_email: required("MAIL_FROM")?,
            from_name: env::var("MAIL_FROM_NAME").unwrap_or_else(|_| "CorestoneGrader".to_string()),
            notify_email: required("CONTACT_NOTIFY_EMAIL")?,
        }))
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    optional(key).ok_or(ConfigError::MissingVar(key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(key, e.to_string())),
        None => {
            tracing::debug!("{key} not set, using default");
            Ok(default)
        }
    }
}
