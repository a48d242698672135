//! Logging mail transport.
//!
//! The real delivery pipeline lives outside this service; deployments wire
//! their own `Mailer`. This adapter logs the message envelope and returns a
//! generated receipt, which is enough for local runs and staging smoke tests.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::domain::ports::{EmailMessage, EmailReceipt, Mailer, MailerError};

/// Transport that records messages to the log instead of sending them.
#[derive(Debug, Default, Clone)]
pub struct LoggingMailer;

impl LoggingMailer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mailer for LoggingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<EmailReceipt, MailerError> {
        let message_id = format!("log-{}", Uuid::new_v4());
        info!(
            recipient = message.recipient,
            subject = message.subject,
            group = message.group_name,
            purpose = ?message.purpose,
            message_id,
            "outbound email (logging transport)"
        );
        Ok(EmailReceipt { message_id })
    }
}
