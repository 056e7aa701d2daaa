use reqwest::Client;
use serde_json::json;
use tracing::debug;

use super::{NotificationSink, NotifyError};
use crate::config::{ConfigError, NotifyConfig};

/// Sends Markdown messages through the Telegram Bot API.
pub struct TelegramSink {
    client: Client,
    url: String,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(config: &NotifyConfig) -> Result<Self, ConfigError> {
        let token = config
            .telegram_token
            .as_deref()
            .ok_or(ConfigError::MissingCredential("notify.telegram_token"))?;
        let chat_id = config
            .telegram_chat_id
            .clone()
            .ok_or(ConfigError::MissingCredential("notify.telegram_chat_id"))?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "notify",
                reason: format!("cannot build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url: format!(
                "{}/bot{}/sendMessage",
                config.telegram_api.trim_end_matches('/'),
                token
            ),
            chat_id,
        })
    }
}

#[async_trait::async_trait]
impl NotificationSink for TelegramSink {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let payload = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });

        let resp = self.client.post(&self.url).json(&payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(chat_id = %self.chat_id, bytes = text.len(), "telegram message delivered");
        Ok(())
    }
}
