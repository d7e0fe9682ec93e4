/// SendGrid client — plain-text transactional email delivery.
/// Callers treat delivery as best-effort; see the `email` module.
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

const SENDGRID_API_URL: &str = "https://api.sendgrid.com/v3/mail/send";
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum SendGridError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Serialize)]
struct MailSend<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: EmailAddress<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: Vec<EmailAddress<'a>>,
}

#[derive(Serialize)]
struct EmailAddress<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

#[derive(Clone)]
pub struct SendGridClient {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

impl SendGridClient {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            from,
        }
    }

    /// POST v3/mail/send. SendGrid answers 202 on acceptance.
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), SendGridError> {
        let request = MailSend {
            personalizations: vec![Personalization {
                to: vec![EmailAddress { email: to }],
            }],
            from: EmailAddress { email: &self.from },
            subject,
            content: vec![Content {
                content_type: "text/plain",
                value: body,
            }],
        };

        let response = self
            .client
            .post(SENDGRID_API_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SendGridError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!("Email '{subject}' accepted for {to}");
        Ok(())
    }
}
