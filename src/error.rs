//! Error types for the marquee pipeline.

use crate::bridge::BridgeError;

/// Top-level error type for generation, delivery and configuration.
#[derive(Debug, thiserror::Error)]
pub enum MarqueeError {
    /// Model service and CLI fallback both failed to produce text.
    #[error("generation error: {0}")]
    Generation(String),

    /// Delivery to the display device failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Radio bridge helper failure.
    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Serial port error.
    #[error("serial error: {0}")]
    Serial(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serialport::Error> for MarqueeError {
    fn from(err: serialport::Error) -> Self {
        Self::Serial(err.to_string())
    }
}

impl From<reqwest::Error> for MarqueeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, MarqueeError>;
