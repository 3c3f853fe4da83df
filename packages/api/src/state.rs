use std::{sync::Arc, time::Duration};

use anyhow::Context;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::{
    config::ApiConfig,
    export::{GotenbergRenderer, PdfRenderer},
    grading::{EssayGrader, OpenAiGrader},
    mail::{DynMailClient, create_mail_client},
    session::{FirebaseVerifier, SessionKeys},
};

pub type AppState = Arc<State>;

pub struct State {
    pub config: ApiConfig,
    pub db: DatabaseConnection,
    pub session_keys: SessionKeys,
    pub grader: Arc<dyn EssayGrader>,
    pub pdf_renderer: Arc<dyn PdfRenderer>,
    pub stripe_client: Option<stripe::Client>,
    pub mail_client: Option<DynMailClient>,
    /// Present when `FIREBASE_PROJECT_ID` is configured
    pub firebase: Option<FirebaseVerifier>,
}

impl State {
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let mut opt = ConnectOptions::new(config.database_url.clone());
        opt.max_connections(10)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(8))
            .sqlx_logging(false);
        let db = Database::connect(opt)
            .await
            .context("Failed to connect to database")?;

        let grader = OpenAiGrader::new(
            &config.openai_endpoint,
            &config.openai_api_key,
            &config.openai_model,
        )
        .context("Failed to build grading client")?;
        let pdf_renderer = GotenbergRenderer::new(&config.pdf_renderer_url)
            .context("Failed to build PDF renderer client")?;

        let stripe_client = match &config.stripe_secret_key {
            Some(key) => Some(stripe::Client::new(key.clone())),
            None => {
                tracing::warn!("STRIPE_SECRET_KEY not set, purchases are granted without payment");
                None
            }
        };

        let mail_client = match &config.smtp {
            Some(smtp) => match create_mail_client(smtp) {
                Ok(client) => Some(client),
                Err(e) => {
                    tracing::warn!("Failed to initialize mail client: {}", e);
                    None
                }
            },
            None => None,
        };

        let firebase = match &config.firebase_project_id {
            Some(project_id) => Some(
                FirebaseVerifier::fetch(project_id)
                    .await
                    .context("Failed to load Firebase signing keys")?,
            ),
            None => {
                tracing::warn!(
                    "FIREBASE_PROJECT_ID not set, federated logins are trusted without an ID token"
                );
                None
            }
        };

        let mut state = Self::with_services(config, db, Arc::new(grader), Arc::new(pdf_renderer));
        state.stripe_client = stripe_client;
        state.mail_client = mail_client;
        state.firebase = firebase;
        Ok(state)
    }

    /// State without payment, mail or federated verification. Used by the
    /// test suite to plug in an in-memory database and fake services.
    pub fn with_services(
        config: ApiConfig,
        db: DatabaseConnection,
        grader: Arc<dyn EssayGrader>,
        pdf_renderer: Arc<dyn PdfRenderer>,
    ) -> Self {
        let session_keys = SessionKeys::new(
            &config.session_secret,
            config.session_ttl_hours,
            config.cookie_secure,
        );
        Self {
            config,
            db,
            session_keys,
            grader,
            pdf_renderer,
            stripe_client: None,
            mail_client: None,
            firebase: None,
        }
    }
}
