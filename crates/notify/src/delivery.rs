use std::future::Future;

use thiserror::Error;
use tracing::info;

use crate::embed::Message;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Sends one message payload. Callers deliver messages one at a time, in
/// composer order.
pub trait Delivery {
    fn deliver(&self, message: &Message) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Logs each payload instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct LogDelivery;

impl Delivery for LogDelivery {
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        let payload = serde_json::to_string(message)?;
        info!(embeds = message.embeds.len(), %payload, "dry run, message not sent");
        Ok(())
    }
}
