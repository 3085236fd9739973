//! Outbound email delivery.
//!
//! Code paths that email the user never block on delivery: the primary
//! operation commits first and the send runs as a detached task whose
//! failure is only ever logged. The `EmailSender` trait hides the
//! transport; SMTP for real deployments, a logging stub otherwise.

use anyhow::{Context, Result};
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, Message, SmtpTransport,
    Transport,
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    #[must_use]
    pub fn new(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: "Credexa Notification".to_string(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }
}

/// Email delivery abstraction.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error for the caller to log.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "email send stub: {}",
            message.body
        );
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from: String,
}

/// SMTP sender over a relay with credentials.
pub struct SmtpEmailSender {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpEmailSender {
    /// # Errors
    /// Returns an error if the relay host or from address is invalid.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let transport = SmtpTransport::relay(&config.host)
            .with_context(|| format!("invalid SMTP relay host: {}", config.host))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            ))
            .build();
        let from = format!("Credexa <{}>", config.from)
            .parse()
            .with_context(|| format!("invalid from address: {}", config.from))?;
        Ok(Self { transport, from })
    }
}

impl EmailSender for SmtpEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(message
                .to
                .parse()
                .with_context(|| format!("invalid recipient: {}", message.to))?)
            .subject(message.subject.clone())
            .body(message.body.clone())
            .context("failed to build email")?;
        self.transport
            .send(&email)
            .map(|_| ())
            .context("SMTP send failed")
    }
}

/// Fire-and-forget delivery. The caller's response is already committed;
/// a transport failure must never surface back to it.
pub(crate) fn send_detached(sender: Arc<dyn EmailSender>, message: EmailMessage) {
    tokio::spawn(async move {
        let to = message.to.clone();
        let result = tokio::task::spawn_blocking(move || sender.send(&message)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!("Email sending failed for {to}: {err:#}"),
            Err(err) => error!("Email task panicked for {to}: {err}"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_defaults_subject() {
        let message = EmailMessage::new("jane@x.com", "Your OTP code is 123456");
        assert_eq!(message.subject, "Credexa Notification");
        assert_eq!(message.to, "jane@x.com");

        let message = message.with_subject("Verify Your New Email Address");
        assert_eq!(message.subject, "Verify Your New Email Address");
    }

    #[test]
    fn log_sender_always_succeeds() {
        let sender = LogEmailSender;
        let message = EmailMessage::new("jane@x.com", "hello");
        assert!(sender.send(&message).is_ok());
    }

    #[test]
    fn smtp_sender_rejects_bad_from_address() {
        let config = SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "user".to_string(),
            password: SecretString::from("pass".to_string()),
            from: "not an address".to_string(),
        };
        assert!(SmtpEmailSender::new(&config).is_err());
    }
}
