//! Transport dispatcher.
//!
//! Exactly one [`Transport`] is built at start-up from configuration and every
//! cycle hands it the formatted payload. Network and serial coerce the wire
//! text to 7-bit ASCII themselves; the radio transport leaves that to the
//! bridge helper.

pub mod network;
pub mod radio;
pub mod serial;

pub use network::NetworkTransport;
pub use radio::RadioTransport;
pub use serial::SerialTransport;

use crate::config::{TransportConfig, TransportKind};
use crate::error::{MarqueeError, Result};
use crate::format::FormattedPayload;
use async_trait::async_trait;
use std::fmt;

/// What a successful delivery reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub transport: TransportKind,
    pub bytes: usize,
}

impl fmt::Display for DeliveryReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ok-{} ({} bytes)", self.transport, self.bytes)
    }
}

/// Delivery contract shared by every transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which transport this is.
    fn kind(&self) -> TransportKind;

    /// Start-up warm-up (open the port, establish the radio link).
    /// Callers log failures and carry on.
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Delivers one payload, terminator included.
    async fn deliver(&self, payload: &FormattedPayload) -> Result<DeliveryReceipt>;

    /// Releases held resources. Best-effort; never fails.
    async fn shutdown(&self) {}
}

/// Builds the configured transport.
///
/// # Errors
///
/// Returns [`MarqueeError::Config`] when the selected transport lacks its
/// endpoint URL or port.
pub fn from_config(config: &TransportConfig) -> Result<Box<dyn Transport>> {
    let transport: Box<dyn Transport> = match config.kind {
        TransportKind::Radio => Box::new(RadioTransport::new(&config.radio)),
        TransportKind::Network => {
            let url = config.network.url.clone().ok_or_else(|| {
                MarqueeError::Config("network transport needs an endpoint URL".to_owned())
            })?;
            Box::new(NetworkTransport::new(url, config.network.timeout_secs))
        }
        TransportKind::Serial => {
            let port = config.serial.port.clone().ok_or_else(|| {
                MarqueeError::Config("serial transport needs a port".to_owned())
            })?;
            Box::new(SerialTransport::new(
                port,
                config.serial.baud,
                config.serial.timeout_ms,
            ))
        }
    };
    Ok(transport)
}

/// Replaces every non-ASCII character with `?`.
pub fn to_ascii_lossy(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii() { c } else { '?' })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn ascii_coercion_replaces_non_ascii() {
        assert_eq!(to_ascii_lossy("caf\u{e9} \u{1f31f}.\n"), "caf? ?.\n");
        assert_eq!(to_ascii_lossy("plain.\n"), "plain.\n");
    }

    #[test]
    fn receipt_display() {
        let receipt = DeliveryReceipt {
            transport: TransportKind::Serial,
            bytes: 14,
        };
        assert_eq!(receipt.to_string(), "ok-serial (14 bytes)");
    }

    #[test]
    fn from_config_selects_kind() {
        let mut config = TransportConfig::default();
        assert_eq!(from_config(&config).unwrap().kind(), TransportKind::Radio);

        config.kind = TransportKind::Network;
        config.network.url = Some("http://panel.local/post".to_owned());
        assert_eq!(from_config(&config).unwrap().kind(), TransportKind::Network);

        config.kind = TransportKind::Serial;
        config.serial.port = Some("/dev/ttyUSB0".to_owned());
        assert_eq!(from_config(&config).unwrap().kind(), TransportKind::Serial);
    }

    #[test]
    fn from_config_rejects_missing_endpoint() {
        let config = TransportConfig {
            kind: TransportKind::Network,
            ..TransportConfig::default()
        };
        let err = from_config(&config).err().unwrap();
        assert!(matches!(err, MarqueeError::Config(_)));
    }
}
