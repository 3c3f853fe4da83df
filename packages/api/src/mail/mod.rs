use std::sync::Arc;

use anyhow::Result;

use crate::config::SmtpConfig;

#[cfg(feature = "smtp")]
mod smtp;
pub mod templates;

#[cfg(feature = "smtp")]
pub use smtp::SmtpMailClient;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
}

#[async_trait::async_trait]
pub trait MailClient: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<()>;
}

pub type DynMailClient = Arc<dyn MailClient>;

pub fn create_mail_client(config: &SmtpConfig) -> Result<DynMailClient> {
    #[cfg(feature = "smtp")]
    {
        let client = SmtpMailClient::new(config)?;
        Ok(Arc::new(client))
    }
    #[cfg(not(feature = "smtp"))]
    {
        let _ = config;
        Err(anyhow::anyhow!("SMTP feature not enabled"))
    }
}
