//! Delivery of flattened batches to the aggregation endpoint.

use async_trait::async_trait;
use log::debug;

use super::types::FlattenedEvent;
use crate::error_handling::types::TransportError;

#[async_trait]
pub trait BatchSender: Send + Sync {
    /// Delivers one batch. `Ok` means the server acknowledged it with a 2xx.
    async fn send_batch(&self, batch: &[FlattenedEvent]) -> Result<(), TransportError>;
}

/// POSTs batches as a JSON array over HTTP.
pub struct HttpBatchSender {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBatchSender {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl BatchSender for HttpBatchSender {
    async fn send_batch(&self, batch: &[FlattenedEvent]) -> Result<(), TransportError> {
        debug!("POST {} ({} events)", self.endpoint, batch.len());
        let response = self
            .client
            .post(&self.endpoint)
            .json(batch)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
