use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tokio::time::timeout;

use crate::auth::{AuthError, AuthResult};

const MAIL_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Outbound email collaborator. Failures are reported, never retried here.
#[rocket::async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> AuthResult<()>;
}

/// Posts messages to an HTTP mail relay as JSON.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    relay_url: String,
    from: String,
    http: Client,
}

impl HttpNotifier {
    pub fn new(relay_url: impl Into<String>, from: impl Into<String>, http: Client) -> Self {
        Self {
            relay_url: relay_url.into().trim_end_matches('/').to_string(),
            from: from.into(),
            http,
        }
    }
}

#[rocket::async_trait]
impl Notifier for HttpNotifier {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> AuthResult<()> {
        #[derive(Serialize)]
        struct MailRequest<'a> {
            from: &'a str,
            to: &'a str,
            subject: &'a str,
            html: &'a str,
        }

        let payload = MailRequest {
            from: &self.from,
            to,
            subject,
            html,
        };

        let response = timeout(
            MAIL_REQUEST_TIMEOUT,
            self.http.post(&self.relay_url).json(&payload).send(),
        )
        .await
        .map_err(|_| {
            AuthError::Delivery(format!("mail relay timed out after {MAIL_REQUEST_TIMEOUT:?}"))
        })?
        .map_err(|err| AuthError::Delivery(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            log::warn!("mail relay rejected message to {}: {} {}", to, status, body);
            return Err(AuthError::Delivery(format!("mail relay returned {status}")));
        }

        log::debug!("mail relay accepted message to {}", to);
        Ok(())
    }
}

/// Development notifier that only records the dispatch in the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[rocket::async_trait]
impl Notifier for LogNotifier {
    async fn send_email(&self, to: &str, subject: &str, _html: &str) -> AuthResult<()> {
        log::info!("email to {} not delivered (no relay configured): {}", to, subject);
        Ok(())
    }
}
