//! Outbound mail collaborator.
//!
//! Delivery is best-effort from the workflows' point of view; callers decide whether a
//! failure matters (it never does for status transitions).

use serde::{Deserialize, Serialize};
use tracing::info;

/// A formatted message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub recipient: String,
    pub subject: String,
    pub body_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_html: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("mail transport unavailable: {0}")]
    Transport(String),
    #[error("invalid recipient address '{0}'")]
    InvalidRecipient(String),
}

pub trait Notifier: Send + Sync {
    fn send(&self, message: MailMessage) -> Result<(), NotifyError>;
}

/// Notifier that records outgoing mail in the service log instead of delivering it.
#[derive(Debug, Clone)]
pub struct TracingNotifier {
    sender: String,
}

impl TracingNotifier {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

impl Notifier for TracingNotifier {
    fn send(&self, message: MailMessage) -> Result<(), NotifyError> {
        if !message.recipient.contains('@') {
            return Err(NotifyError::InvalidRecipient(message.recipient));
        }

        info!(
            sender = %self.sender,
            recipient = %message.recipient,
            subject = %message.subject,
            has_html = message.body_html.is_some(),
            "outgoing mail"
        );
        Ok(())
    }
}
