//! Facebook Messenger Platform channel.
//!
//! Sends page messages via the Graph API `me/messages` endpoint using a
//! page access token. Chunking to the platform payload limit is the
//! caller's job; this channel sends exactly the text it is given.

use async_trait::async_trait;
use std::time::Duration;

use opsrelay_core::config::MessengerChannelConfig;
use opsrelay_core::error::{RelayError, Result};
use opsrelay_core::traits::NotifySink;

const GRAPH_URL: &str = "https://graph.facebook.com/v18.0/me/messages";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct MessengerChannel {
    config: MessengerChannelConfig,
    client: reqwest::Client,
}

impl MessengerChannel {
    pub fn new(config: MessengerChannelConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Send a text message to a page-scoped recipient id.
    pub async fn send_text(&self, recipient_id: &str, text: &str) -> Result<()> {
        if !self.config.enabled || self.config.page_access_token.is_empty() {
            return Err(RelayError::Config(
                "Messenger page_access_token not configured".into(),
            ));
        }

        let body = serde_json::json!({
            "recipient": {"id": recipient_id},
            "message": {"text": text},
        });

        let response = self
            .client
            .post(GRAPH_URL)
            .query(&[("access_token", self.config.page_access_token.as_str())])
            .json(&body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| RelayError::Channel(format!("Messenger send failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RelayError::Channel(format!(
                "Messenger API error {status}: {error_text}"
            )));
        }

        tracing::debug!("Messenger message sent to {recipient_id}");
        Ok(())
    }
}

#[async_trait]
impl NotifySink for MessengerChannel {
    async fn send(&self, recipient_id: &str, text: &str) -> Result<()> {
        self.send_text(recipient_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_channel_rejects_send() {
        let channel = MessengerChannel::new(MessengerChannelConfig::default());
        let err = channel.send_text("R1", "hello").await.unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[tokio::test]
    async fn test_disabled_channel_rejects_send() {
        let channel = MessengerChannel::new(MessengerChannelConfig {
            enabled: false,
            page_access_token: "tok".into(),
        });
        assert!(channel.send_text("R1", "hello").await.is_err());
    }
}
