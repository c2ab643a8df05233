//! Notification gateway combining the push and mail channels.

use async_trait::async_trait;
use segurospy_core::config::SegurosConfig;
use segurospy_core::error::Result;
use segurospy_core::traits::NotificationGateway;

use crate::email::SmtpMailer;
use crate::telegram::TelegramPush;

pub struct NotifyGateway {
    push: TelegramPush,
    mail: SmtpMailer,
}

impl NotifyGateway {
    pub fn new(push: TelegramPush, mail: SmtpMailer) -> Self {
        Self { push, mail }
    }

    /// Build both channels from config. Unconfigured channels fail at send time.
    pub fn from_config(config: &SegurosConfig) -> Self {
        if !config.telegram.is_configured() {
            tracing::warn!("⚠️ Telegram bot token/chat id missing, push notifications disabled");
        }
        Self::new(
            TelegramPush::new(config.telegram.clone()),
            SmtpMailer::new(config.email.clone()),
        )
    }
}

#[async_trait]
impl NotificationGateway for NotifyGateway {
    async fn send_push(&self, text: &str) -> Result<()> {
        self.push.send_message(text).await
    }

    async fn send_mail(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        self.mail.send_html(to, subject, html_body).await
    }
}
