//! Operator alerts.
//!
//! Validators that escalate by message go through a [`Notifier`]. Without an
//! `[smtp]` section the [`DisabledNotifier`] drops every alert with a debug
//! line. With one, [`SmtpNotifier`] (feature `email`) delivers it by SMTP.

use crate::config::SmtpConfig;
use crate::error::{AppResult, LoggerError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Subject line used for validator alerts
pub const VALIDATOR_SUBJECT: &str = "[lab-logger] Validator warning";

/// Delivers an alert to the operators
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send one message
    async fn send(&self, subject: &str, body: &str) -> AppResult<()>;
}

/// Notifier used when no SMTP server is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, subject: &str, _body: &str) -> AppResult<()> {
        debug!(subject, "alerting disabled, message dropped");
        Ok(())
    }
}

/// Build the notifier for the configured SMTP settings
///
/// # Errors
/// - `FeatureNotEnabled` if SMTP is configured but the `email` feature is off
/// - `Configuration` if an address cannot be parsed
pub fn from_config(smtp: Option<&SmtpConfig>) -> AppResult<Arc<dyn Notifier>> {
    match smtp {
        None => Ok(Arc::new(DisabledNotifier)),
        Some(settings) => smtp_notifier(settings),
    }
}

#[cfg(feature = "email")]
fn smtp_notifier(settings: &SmtpConfig) -> AppResult<Arc<dyn Notifier>> {
    Ok(Arc::new(SmtpNotifier::new(settings)?))
}

#[cfg(not(feature = "email"))]
fn smtp_notifier(_settings: &SmtpConfig) -> AppResult<Arc<dyn Notifier>> {
    Err(LoggerError::FeatureNotEnabled("email".to_string()))
}

#[cfg(feature = "email")]
pub use smtp::SmtpNotifier;

#[cfg(feature = "email")]
mod smtp {
    use super::*;
    use lettre::message::Mailbox;
    use lettre::transport::smtp::authentication::Credentials;
    use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

    /// SMTP delivery through `lettre`
    pub struct SmtpNotifier {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
        recipients: Vec<Mailbox>,
    }

    impl SmtpNotifier {
        /// Validate addresses and prepare the transport; no connection is made yet
        pub fn new(settings: &SmtpConfig) -> AppResult<Self> {
            let mailbox = |address: &str| {
                address.parse::<Mailbox>().map_err(|e| {
                    LoggerError::Configuration(format!("invalid email address '{address}': {e}"))
                })
            };

            if settings.recipients.is_empty() {
                return Err(LoggerError::Configuration(
                    "smtp.recipients must not be empty".to_string(),
                ));
            }
            let from = mailbox(&settings.from)?;
            let recipients = settings
                .recipients
                .iter()
                .map(|r| mailbox(r))
                .collect::<AppResult<Vec<_>>>()?;

            let mut builder = if settings.tls {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host).map_err(|e| {
                    LoggerError::Configuration(format!("invalid SMTP host '{}': {e}", settings.host))
                })?
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
            };
            if let Some(port) = settings.port {
                builder = builder.port(port);
            }
            if let (Some(user), Some(password)) = (&settings.username, &settings.password) {
                builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
            }

            Ok(Self {
                transport: builder.build(),
                from,
                recipients,
            })
        }
    }

    #[async_trait]
    impl Notifier for SmtpNotifier {
        async fn send(&self, subject: &str, body: &str) -> AppResult<()> {
            let mut message = Message::builder().from(self.from.clone()).subject(subject);
            for recipient in &self.recipients {
                message = message.to(recipient.clone());
            }
            let message = message
                .body(body.to_string())
                .map_err(|e| LoggerError::Alert(e.to_string()))?;

            self.transport
                .send(message)
                .await
                .map_err(|e| LoggerError::Alert(e.to_string()))?;
            debug!(subject, recipients = self.recipients.len(), "alert sent");
            Ok(())
        }
    }
}
