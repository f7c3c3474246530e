//! Marquee: language-model text for a scrolling LED panel.
//!
//! Two halves share this crate:
//!
//! - **Host side**: a background loop asks a local model for one short
//!   sentence, shapes it for the panel and delivers it over radio, network
//!   or serial.
//! - **Panel side**: inbound bytes from any channel are merged into live
//!   messages, and a display sequencer dissolves the old text, shows a
//!   thinking indicator and types the new text out.
//!
//! # Architecture
//!
//! - **Generator**: model service with a command-line fallback ([`generator`])
//! - **Formatter**: first sentence, token cap, word wrap ([`format`])
//! - **Transport**: one of radio, network or serial ([`transport`])
//! - **Bridge**: long-lived radio helper over a JSON line protocol ([`bridge`])
//! - **Device**: ingestion, sequencing, dissolve and rendering ([`device`])

pub mod bridge;
pub mod config;
pub mod daemon;
pub mod device;
pub mod error;
pub mod format;
pub mod generator;
pub mod transport;

pub use config::MarqueeConfig;
pub use daemon::{CycleReport, Daemon};
pub use error::{MarqueeError, Result};
pub use format::{FormattedPayload, format_response};
pub use generator::{GenerationPath, Generator};
pub use transport::{DeliveryReceipt, Transport};
