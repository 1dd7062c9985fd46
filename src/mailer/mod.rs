//! Outbound account notifications.
//!
//! The flow controller talks to the `Mailer` trait only; delivery failures
//! are logged and never fail the request that triggered them. Production
//! uses the async SMTP transport, development runs log-only, and tests
//! record into memory.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::MailConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Delivers over an authenticated SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let from: Mailbox = config
            .from_address
            .parse()
            .context("invalid mail.from_address")?;
        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .context("SMTP relay configuration failed")?
            .credentials(creds)
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(10)))
            .build();
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse().context("invalid recipient address")?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("failed to build message")?;

        self.transport
            .send(message)
            .await
            .context("SMTP delivery failed")?;
        tracing::debug!(to = %to, subject = %subject, "mail delivered");
        Ok(())
    }
}

/// Stands in when `mail.enabled = false`: logs the message, including the
/// body, so codes and links stay reachable during local development.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        tracing::info!(to = %to, subject = %subject, body = %body, "mail delivery disabled; logging instead");
        Ok(())
    }
}

// ── Templates ───────────────────────────────────────────────────────

const VERIFICATION_SUBJECT: &str = "Verify your Quorum account";
const WELCOME_SUBJECT: &str = "Welcome to Quorum";
const RESET_SUBJECT: &str = "Reset your Quorum password";
const RESET_SUCCESS_SUBJECT: &str = "Your Quorum password was changed";

pub fn verification_body(name: &str, code: &str) -> String {
    format!(
        "Hi {name},\n\
        \n\
        Welcome to Quorum! Please verify your email address using the following code:\n\
        \n\
        {code}\n\
        \n\
        This code will expire in 24 hours.\n\
        \n\
        Best regards,\n\
        The Quorum Team"
    )
}

pub fn welcome_body(name: &str) -> String {
    format!(
        "Hi {name},\n\
        \n\
        Your account is ready. Create a decision room, invite your people, and\n\
        put the question to a vote.\n\
        \n\
        Best regards,\n\
        The Quorum Team"
    )
}

pub fn reset_body(reset_link: &str) -> String {
    format!(
        "Hello,\n\
        \n\
        A password reset was requested for your Quorum account.\n\
        \n\
        Use the link below to choose a new password:\n\
        \n\
        {reset_link}\n\
        \n\
        This link will expire in 1 hour.\n\
        \n\
        If you did not request this reset, you can ignore this email.\n\
        \n\
        Best regards,\n\
        The Quorum Team"
    )
}

pub fn reset_success_body(name: &str) -> String {
    format!(
        "Hi {name},\n\
        \n\
        Your Quorum password has been changed successfully.\n\
        \n\
        If this wasn't you, reset your password immediately.\n\
        \n\
        Best regards,\n\
        The Quorum Team"
    )
}

pub async fn send_verification_email(
    mailer: &dyn Mailer,
    to: &str,
    name: &str,
    code: &str,
) -> Result<()> {
    mailer
        .send(to, VERIFICATION_SUBJECT, &verification_body(name, code))
        .await
}

pub async fn send_welcome_email(mailer: &dyn Mailer, to: &str, name: &str) -> Result<()> {
    mailer.send(to, WELCOME_SUBJECT, &welcome_body(name)).await
}

pub async fn send_reset_email(mailer: &dyn Mailer, to: &str, reset_link: &str) -> Result<()> {
    mailer.send(to, RESET_SUBJECT, &reset_body(reset_link)).await
}

pub async fn send_reset_success_email(mailer: &dyn Mailer, to: &str, name: &str) -> Result<()> {
    mailer
        .send(to, RESET_SUCCESS_SUBJECT, &reset_success_body(name))
        .await
}

// ── Test double ─────────────────────────────────────────────────────

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Records every message; flips to failure mode on demand so callers can
/// prove delivery problems stay non-fatal.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: parking_lot::Mutex<Vec<SentMail>>,
    pub fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn last(&self) -> Option<SentMail> {
        self.sent.lock().last().cloned()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("recording mailer set to fail");
        }
        self.sent.lock().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
