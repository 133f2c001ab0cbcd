use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::MailConfig;

/// Outbound notification channel used by alert delivery.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, to: &str, subject: &str, html_body: &str, text_body: &str) -> Result<()>;
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

/// Posts messages as JSON to an HTTP mail relay.
pub struct HttpMailer {
    client: Client,
    url: String,
    token: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(config: &MailConfig, url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build mail relay client")?;
        Ok(Self {
            client,
            url: url.into(),
            token: config.api_token.clone(),
            from: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str, text_body: &str) -> Result<()> {
        let payload = RelayMessage {
            from: &self.from,
            to: [to],
            subject,
            html: html_body,
            text: text_body,
        };

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        debug!(%to, %subject, "posting message to mail relay");
        let response = request
            .send()
            .await
            .context("mail relay request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "mail relay rejected message");
            return Err(anyhow!("mail relay responded with status {status}"));
        }
        Ok(())
    }
}

/// Writes messages to the log instead of sending them. Used when no relay
/// is configured.
#[derive(Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, _html_body: &str, text_body: &str) -> Result<()> {
        info!(%to, %subject, body_len = text_body.len(), "mail relay not configured; logged message");
        Ok(())
    }
}

pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    match &config.api_url {
        Some(url) => Ok(Arc::new(HttpMailer::new(config, url.clone())?)),
        None => Ok(Arc::new(LogMailer)),
    }
}
