//! Outbound email and SMS.
//!
//! Services commit first and notify afterwards. A failed delivery is logged
//! and never undoes the committed change; the user can ask for a new token.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType,
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use parking_lot::Mutex;
use secrecy::ExposeSecret;
use thiserror::Error;

use vic_shop_core::Email;

use crate::config::EmailConfig;

/// Errors that can occur when sending a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Delivery refused by the channel.
    #[error("delivery failed: {0}")]
    Rejected(String),
}

/// Delivers messages to users.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a plain-text email.
    async fn send_email(&self, to: &Email, subject: &str, body: &str)
    -> Result<(), NotifyError>;

    /// Send a verification code by SMS.
    async fn send_sms(&self, phone: &str, code: &str) -> Result<(), NotifyError>;
}

/// Email over SMTP. SMS has no provider and is only logged.
#[derive(Clone)]
pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpNotifier {
    /// Create a notifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the relay address is invalid.
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_email(
        &self,
        to: &Email,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| NotifyError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .as_str()
                .parse()
                .map_err(|_| NotifyError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_owned())?;

        self.mailer.send(email).await?;
        tracing::info!(to = %to, subject, "email sent");
        Ok(())
    }

    async fn send_sms(&self, phone: &str, code: &str) -> Result<(), NotifyError> {
        tracing::info!(phone, code, "SMS verification code (no SMS provider configured)");
        Ok(())
    }
}

/// Logs every message instead of sending it. Used when SMTP is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_email(
        &self,
        to: &Email,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        tracing::info!(to = %to, subject, body, "email (not sent, SMTP not configured)");
        Ok(())
    }

    async fn send_sms(&self, phone: &str, code: &str) -> Result<(), NotifyError> {
        tracing::info!(phone, code, "SMS (not sent)");
        Ok(())
    }
}

/// A message captured by [`MemoryNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    Email {
        to: String,
        subject: String,
        body: String,
    },
    Sms {
        phone: String,
        code: String,
    },
}

/// Records messages in memory. Can be told to fail every delivery.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<SentMessage>>,
    failing: bool,
}

impl MemoryNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            failing: true,
        }
    }

    /// Everything delivered so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Emails delivered to `to`.
    #[must_use]
    pub fn emails_to(&self, to: &str) -> Vec<SentMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|m| matches!(m, SentMessage::Email { to: addr, .. } if addr == to))
            .cloned()
            .collect()
    }

    fn record(&self, message: SentMessage) -> Result<(), NotifyError> {
        if self.failing {
            return Err(NotifyError::Rejected("memory notifier set to fail".to_owned()));
        }
        self.sent.lock().push(message);
        Ok(())
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send_email(
        &self,
        to: &Email,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        self.record(SentMessage::Email {
            to: to.to_string(),
            subject: subject.to_owned(),
            body: body.to_owned(),
        })
    }

    async fn send_sms(&self, phone: &str, code: &str) -> Result<(), NotifyError> {
        self.record(SentMessage::Sms {
            phone: phone.to_owned(),
            code: code.to_owned(),
        })
    }
}

/// A message a service wants sent once its unit of work has committed.
#[derive(Debug, Clone)]
pub enum Notification {
    EmailVerification {
        to: Email,
        token: String,
    },
    PhoneVerification {
        phone: String,
        code: String,
    },
    PasswordReset {
        to: Email,
        token: String,
    },
    AdminInvitation {
        to: Email,
        token: String,
        temporary_password: String,
    },
}

impl Notification {
    async fn send(&self, notifier: &dyn Notifier, base_url: &str) -> Result<(), NotifyError> {
        match self {
            Self::EmailVerification { to, token } => {
                let body = format!(
                    "Welcome to Vic Shop.\n\n\
                     Confirm your email address with this token:\n\n{token}\n\n\
                     Submit it at {base_url}/auth/verify-email within 24 hours."
                );
                notifier
                    .send_email(to, "Verify your Vic Shop email address", &body)
                    .await
            }
            Self::PhoneVerification { phone, code } => notifier.send_sms(phone, code).await,
            Self::PasswordReset { to, token } => {
                let body = format!(
                    "A password reset was requested for your account.\n\n\
                     Reset token:\n\n{token}\n\n\
                     Submit it with your new password at {base_url}/auth/password-reset/confirm \
                     within 24 hours. If you did not ask for this, ignore this email."
                );
                notifier
                    .send_email(to, "Reset your Vic Shop password", &body)
                    .await
            }
            Self::AdminInvitation {
                to,
                token,
                temporary_password,
            } => {
                let body = format!(
                    "You have been invited to administer Vic Shop.\n\n\
                     Invitation token:\n\n{token}\n\n\
                     Temporary password: {temporary_password}\n\n\
                     Accept at {base_url}/auth/accept-invitation within 7 days, \
                     then change your password."
                );
                notifier
                    .send_email(to, "Your Vic Shop administrator invitation", &body)
                    .await
            }
        }
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::EmailVerification { .. } => "email_verification",
            Self::PhoneVerification { .. } => "phone_verification",
            Self::PasswordReset { .. } => "password_reset",
            Self::AdminInvitation { .. } => "admin_invitation",
        }
    }
}

/// Send every notification, logging failures.
pub async fn deliver_all(notifier: &dyn Notifier, base_url: &str, notifications: Vec<Notification>) {
    for notification in notifications {
        if let Err(e) = notification.send(notifier, base_url).await {
            tracing::warn!(
                error = %e,
                notification = notification.label(),
                "failed to deliver notification"
            );
        }
    }
}
