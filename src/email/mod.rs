//! Outbound email.
//!
//! `HttpMailer` posts to a transactional-mail HTTP API. `LogMailer` stands in
//! when delivery is disabled so local development still prints sign-in links
//! to nobody but the log.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::config::{EmailConfig, Settings};
use crate::error::EmailError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<()>;
}

pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpMailer {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        let res = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&message)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!("Email provider returned {} for {:?}", status, message.to);
            return Err(EmailError::Rejected(format!("{}: {}", status, body)).into());
        }

        info!("Sent \"{}\" to {:?}", message.subject, message.to);
        Ok(())
    }
}

pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        info!("Email delivery disabled; dropping \"{}\" to {:?}", message.subject, message.to);
        Ok(())
    }
}

pub fn mailer_from_settings(config: &EmailConfig) -> Box<dyn Mailer> {
    if config.enabled {
        Box::new(HttpMailer::new(config))
    } else {
        Box::new(LogMailer)
    }
}

/// Link that signs the holder in when opened.
pub fn magic_link_url(base_url: &str, token: &str) -> Result<Url> {
    // A base without a trailing slash would lose its last path segment on join
    let base = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    };
    let mut url = Url::parse(&base)
        .and_then(|base| base.join("auth/magic-link/verify"))
        .map_err(|e| EmailError::InvalidLink(e.to_string()))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

pub fn magic_link_message(settings: &Settings, to: &str, token: &str) -> Result<EmailMessage> {
    let link = magic_link_url(&settings.app.base_url, token)?;
    let minutes = settings.auth.magic_link_expiry_minutes;

    Ok(EmailMessage {
        from: settings.email.from_address.clone(),
        to: vec![to.to_string()],
        subject: "Your North Star sign-in link".to_string(),
        html: format!(
            "<p>Tap the link below to sign in. It works once and expires in {minutes} minutes.</p>\
             <p><a href=\"{link}\">Sign in to North Star</a></p>\
             <p>If you did not ask for this, you can ignore this email.</p>"
        ),
        text: format!(
            "Sign in to North Star: {link}\n\nThe link works once and expires in {minutes} minutes. \
             If you did not ask for this, you can ignore this email."
        ),
    })
}

/// Builds and sends the sign-in email.
pub async fn send_magic_link(
    mailer: &dyn Mailer,
    settings: &Settings,
    to: &str,
    token: &str,
) -> Result<()> {
    let message = magic_link_message(settings, to, token)?;
    mailer.send(message).await
}
