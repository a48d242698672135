//! Port abstraction over the excluded outbound email transport.
//!
//! The transport's only obligation back to this core is success/failure plus
//! an opaque message identifier.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::define_port_error;

define_port_error! {
    /// Errors raised by mail transport adapters.
    pub enum MailerError {
        /// The transport rejected or failed to accept the message.
        Transport { message: String } => "mail transport failed: {message}",
    }
}

/// Purpose tag attached to outbound mail for transport-side routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailPurpose {
    /// Initial availability-form link.
    AvailabilityRequest,
    /// Staged or manual reminder.
    AvailabilityReminder,
}

/// One outbound message handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    pub group_name: String,
    pub purpose: EmailPurpose,
}

/// Opaque transport receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailReceipt {
    pub message_id: String,
}

/// Port for handing messages to the outbound transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one message; transient transport failures are retryable.
    async fn send(&self, message: &EmailMessage) -> Result<EmailReceipt, MailerError>;
}

/// Fixture transport that accepts everything with a fixed receipt.
#[derive(Debug, Default)]
pub struct FixtureMailer;

#[async_trait]
impl Mailer for FixtureMailer {
    async fn send(&self, _message: &EmailMessage) -> Result<EmailReceipt, MailerError> {
        Ok(EmailReceipt {
            message_id: "fixture".to_owned(),
        })
    }
}
