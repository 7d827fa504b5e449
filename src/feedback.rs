//! User feedback forwarded by mail through an SMTP relay

use crate::config::FeedbackConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

/// Feedback form payload. Every field is optional and may hold any JSON
/// value; non-string values are rendered as JSON text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackRequest {
    pub name: Option<Value>,
    pub email: Option<Value>,
    pub rating: Option<Value>,
    pub message: Option<Value>,
}

/// Rendered feedback mail.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackMessage {
    pub subject: String,
    pub body: String,
}

fn field_text(value: &Option<Value>, default: &str) -> String {
    match value {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

impl FeedbackMessage {
    pub fn from_request(request: &FeedbackRequest) -> Self {
        let name = field_text(&request.name, "Anonymous");
        let email = field_text(&request.email, "No email provided");
        let rating = field_text(&request.rating, "No rating provided");
        let message = field_text(&request.message, "No message provided");

        Self {
            subject: format!("New Feedback from {}", name),
            body: format!(
                "You have received new feedback:\n\n\
                 Name: {}\n\
                 Email: {}\n\
                 Rating: {}\n\
                 Message: {}\n",
                name, email, rating, message
            ),
        }
    }
}

/// Delivers feedback somewhere a human will read it.
#[async_trait]
pub trait FeedbackRelay: Send + Sync {
    async fn send(&self, message: &FeedbackMessage) -> Result<()>;
}

/// STARTTLS SMTP relay.
pub struct SmtpRelay {
    from: Mailbox,
    to: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpRelay {
    /// Build the relay from `EMAIL_FROM`, `EMAIL_PASSWORD` and `EMAIL_TO`.
    ///
    /// `SMTP_SERVER` and `SMTP_PORT` override the configured server.
    pub fn from_env(config: &FeedbackConfig) -> Result<Self> {
        let from = std::env::var("EMAIL_FROM").context("EMAIL_FROM is not set")?;
        let password = std::env::var("EMAIL_PASSWORD").context("EMAIL_PASSWORD is not set")?;
        let to = std::env::var("EMAIL_TO").context("EMAIL_TO is not set")?;
        let server = std::env::var("SMTP_SERVER").unwrap_or_else(|_| config.smtp_server.clone());
        let port = match std::env::var("SMTP_PORT") {
            Ok(port) => port.parse().context("SMTP_PORT is not a valid port")?,
            Err(_) => config.smtp_port,
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&server)
            .with_context(|| format!("Failed to configure SMTP relay {}", server))?
            .port(port)
            .credentials(Credentials::new(from.clone(), password))
            .build();

        info!(server = %server, port = port, "SMTP feedback relay configured");

        Ok(Self {
            from: from.parse().context("EMAIL_FROM is not a valid address")?,
            to: to.parse().context("EMAIL_TO is not a valid address")?,
            transport,
        })
    }
}

#[async_trait]
impl FeedbackRelay for SmtpRelay {
    async fn send(&self, message: &FeedbackMessage) -> Result<()> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .context("Failed to build feedback mail")?;

        self.transport
            .send(email)
            .await
            .context("SMTP relay rejected feedback mail")?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Keeps sent messages in memory.
    #[derive(Default)]
    pub struct RecordingRelay {
        pub sent: Mutex<Vec<FeedbackMessage>>,
    }

    #[async_trait]
    impl FeedbackRelay for RecordingRelay {
        async fn send(&self, message: &FeedbackMessage) -> Result<()> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingRelay;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_defaults() {
        let message = FeedbackMessage::from_request(&FeedbackRequest::default());

        assert_eq!(message.subject, "New Feedback from Anonymous");
        assert!(message.body.contains("Email: No email provided"));
        assert!(message.body.contains("Rating: No rating provided"));
        assert!(message.body.contains("Message: No message provided"));
    }

    #[test]
    fn test_message_numeric_rating() {
        let request: FeedbackRequest = serde_json::from_value(json!({
            "name": "Asha",
            "rating": 5,
            "message": "Fast decision"
        }))
        .unwrap();
        let message = FeedbackMessage::from_request(&request);

        assert_eq!(message.subject, "New Feedback from Asha");
        assert!(message.body.contains("Rating: 5\n"));
        assert!(message.body.contains("Message: Fast decision"));
    }

    #[test]
    fn test_message_non_string_fields() {
        let request: FeedbackRequest = serde_json::from_value(json!({
            "name": 42,
            "email": null,
            "message": ["slow", "payout"]
        }))
        .unwrap();
        let message = FeedbackMessage::from_request(&request);

        assert_eq!(message.subject, "New Feedback from 42");
        assert!(message.body.contains("Email: No email provided"));
        assert!(message.body.contains("Message: [\"slow\",\"payout\"]"));
    }

    #[tokio::test]
    async fn test_recording_relay() {
        let relay = RecordingRelay::default();
        let message = FeedbackMessage::from_request(&FeedbackRequest::default());

        relay.send(&message).await.unwrap();
        assert_eq!(relay.sent.lock().unwrap().len(), 1);
    }
}
