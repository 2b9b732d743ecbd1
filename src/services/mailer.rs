//! Outgoing email over SMTP.

use std::sync::Arc;

use lettre::{
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    message::{Mailbox, Message, header},
    transport::smtp::authentication::Credentials,
};

use super::otp::OtpPurpose;
use crate::config::SmtpConfig;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("smtp: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// SMTP mailer. Without a configured host it only logs what it would send,
/// one-time codes included.
#[derive(Clone)]
pub struct Mailer {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
}

impl Mailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let from = config.from_email.parse::<Mailbox>()?;

        if config.host.trim().is_empty() {
            tracing::warn!("SMTP host not configured; mail will only be logged");
            return Ok(Self {
                transport: None,
                from,
            });
        }

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?.port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: Some(Arc::new(builder.build())),
            from,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    pub async fn send_html(&self, to: &str, subject: &str, html: String) -> Result<(), MailError> {
        let Some(transport) = &self.transport else {
            tracing::info!(subject, "mailer disabled; skipping send");
            return Ok(());
        };

        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse::<Mailbox>()?)
            .subject(subject)
            .header(header::ContentType::TEXT_HTML)
            .body(html)?;

        transport.send(message).await?;
        tracing::info!(subject, "email sent");
        Ok(())
    }

    pub async fn send_otp(
        &self,
        to: &str,
        purpose: OtpPurpose,
        code: &str,
        ttl_secs: i64,
    ) -> Result<(), MailError> {
        if !self.is_enabled() {
            tracing::warn!(to, %purpose, code, ttl_secs, "mailer disabled; one-time code not mailed");
            return Ok(());
        }

        let subject = match purpose {
            OtpPurpose::PasswordReset => "Your password reset code",
            OtpPurpose::EmailVerification => "Verify your email address",
        };
        let body = format!(
            "<p>Your one-time code is:</p>\
             <p style=\"font-size:24px;letter-spacing:4px\"><b>{code}</b></p>\
             <p>It expires in {} minutes. If you did not ask for it, ignore this email.</p>",
            ttl_secs / 60
        );
        self.send_html(to, subject, body).await
    }
}
