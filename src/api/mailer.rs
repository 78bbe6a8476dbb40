// src/api/mailer.rs
//
// Transactional email through the hosted mail API. Notifications are
// best-effort: callers log failures and never fail the request over them.

use serde::Serialize;
use std::fmt;

const MAIL_API_BASE: &str = "https://api.resend.com";

#[derive(Debug)]
pub enum MailError {
    Http(reqwest::Error),
    Api { status: u16, body: String },
}

impl fmt::Display for MailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailError::Http(e) => write!(f, "http error: {e}"),
            MailError::Api { status, body } => {
                write!(f, "mail api error status={status} body={body}")
            }
        }
    }
}

impl From<reqwest::Error> for MailError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

pub async fn send_email(
    api_key: &str,
    from: &str,
    to: &str,
    subject: &str,
    html: &str,
) -> Result<(), MailError> {
    if std::env::var("MOCK_MAIL").unwrap_or_default() == "true" {
        return Ok(());
    }

    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{MAIL_API_BASE}/emails"))
        .bearer_auth(api_key)
        .json(&SendEmailRequest {
            from,
            to: [to],
            subject,
            html,
        })
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(MailError::Api {
            status: status.as_u16(),
            body,
        });
    }

    Ok(())
}

/// Fire-and-forget wrapper used from webhook/refund paths.
pub async fn notify(api_key: &str, from: &str, to: &str, subject: &str, html: &str) {
    if let Err(e) = send_email(api_key, from, to, subject, html).await {
        log::warn!("notification email to {to} failed: {e}");
    }
}
