//! Outbound notification channels.

use async_trait::async_trait;

use crate::error::Result;

/// Sends outbound messages. `Err` means the message was not delivered;
/// callers decide whether that matters.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Instant message to the brokerage's own chat (Telegram, HTML markup).
    async fn send_push(&self, text: &str) -> Result<()>;

    /// Transactional HTML mail to a customer.
    async fn send_mail(&self, to: &str, subject: &str, html_body: &str) -> Result<()>;
}
