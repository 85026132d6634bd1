use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::delivery::{Delivery, DeliveryError};
use crate::embed::Message;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts messages to a Discord webhook URL.
#[derive(Debug, Clone)]
pub struct DiscordWebhook {
    client: Client,
    url: String,
}

impl DiscordWebhook {
    pub fn new(url: impl Into<String>) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl Delivery for DiscordWebhook {
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        let resp = self.client.post(&self.url).json(message).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(status = status.as_u16(), embeds = message.embeds.len(), "webhook accepted message");
        Ok(())
    }
}
