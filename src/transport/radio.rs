//! Radio transport: hands the payload to the bridge helper.

use super::{DeliveryReceipt, Transport};
use crate::bridge::{BridgeSettings, RadioBridge, resolve_helper_program};
use crate::config::{RadioConfig, TransportKind};
use crate::error::Result;
use crate::format::FormattedPayload;
use async_trait::async_trait;
use std::time::Duration;

/// Delivers through a persistent [`RadioBridge`].
#[derive(Debug)]
pub struct RadioTransport {
    bridge: RadioBridge,
}

impl RadioTransport {
    /// Builds the bridge handle; the helper starts on first use.
    pub fn new(config: &RadioConfig) -> Self {
        let settings = BridgeSettings::new(resolve_helper_program(config.bridge_program.as_deref()))
            .with_name(config.name.clone())
            .with_address(config.address.clone())
            .with_command_timeout(Duration::from_secs(config.command_timeout_secs));
        Self::with_bridge(RadioBridge::new(settings))
    }

    /// Wraps an existing bridge handle.
    pub fn with_bridge(bridge: RadioBridge) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Transport for RadioTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Radio
    }

    async fn prepare(&self) -> Result<()> {
        self.bridge.connect().await?;
        tracing::info!("radio link established (persistent)");
        Ok(())
    }

    async fn deliver(&self, payload: &FormattedPayload) -> Result<DeliveryReceipt> {
        let wire = payload.to_wire();
        self.bridge.write(&wire).await?;
        Ok(DeliveryReceipt {
            transport: TransportKind::Radio,
            bytes: wire.len(),
        })
    }

    async fn shutdown(&self) {
        self.bridge.close().await;
    }
}
