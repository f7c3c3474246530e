//! Network transport: plain-text POST to the panel's endpoint.

use super::{DeliveryReceipt, Transport, to_ascii_lossy};
use crate::config::TransportKind;
use crate::error::{MarqueeError, Result};
use crate::format::FormattedPayload;
use async_trait::async_trait;
use std::time::Duration;

/// POSTs the payload as `text/plain`; any non-2xx status is a failure.
#[derive(Debug, Clone)]
pub struct NetworkTransport {
    url: String,
    client: reqwest::Client,
}

impl NetworkTransport {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl Transport for NetworkTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Network
    }

    async fn deliver(&self, payload: &FormattedPayload) -> Result<DeliveryReceipt> {
        let body = to_ascii_lossy(&payload.to_wire());
        let bytes = body.len();

        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(MarqueeError::Transport(format!(
                "panel returned HTTP {}: {}",
                status.as_u16(),
                text.trim()
            )));
        }
        tracing::debug!(url = %self.url, status = status.as_u16(), "payload posted");
        Ok(DeliveryReceipt {
            transport: TransportKind::Network,
            bytes,
        })
    }
}
