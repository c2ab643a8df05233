//! Telegram push channel: Bot API `sendMessage` to the brokerage chat.

use segurospy_core::config::TelegramConfig;
use segurospy_core::error::{Result, SegurosError};
use serde::Deserialize;

/// Sends HTML-formatted messages to one configured chat.
pub struct TelegramPush {
    config: TelegramConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TelegramApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramPush {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    /// Send `text` (Telegram HTML markup) to the configured chat.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        if !self.config.is_configured() {
            tracing::warn!("⚠️ Telegram not configured, message dropped");
            return Err(SegurosError::Delivery("Telegram not configured".into()));
        }

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": self.config.chat_id,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }))
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| SegurosError::Delivery(format!("Telegram send failed: {e}")))?;

        let status = response.status();
        let body: TelegramApiResponse = response
            .json()
            .await
            .map_err(|e| SegurosError::Delivery(format!("Invalid Telegram response ({status}): {e}")))?;

        if !body.ok {
            return Err(SegurosError::Delivery(format!(
                "Telegram API error {status}: {}",
                body.description.unwrap_or_default()
            )));
        }

        tracing::info!("✅ Telegram message sent");
        Ok(())
    }
}
