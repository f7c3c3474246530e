//! Radio bridge: a long-lived helper process that owns the radio connection.
//!
//! The marquee process talks to the helper through [`RadioBridge`]; the
//! helper binary runs [`BridgeServer`] over its stdin/stdout.

#[cfg(feature = "ble")]
pub mod ble;
pub mod client;
pub mod error;
pub mod link;
pub mod protocol;
pub mod server;

pub use client::{BridgeSettings, RadioBridge, resolve_helper_program};
pub use error::BridgeError;
pub use link::{RadioLink, TargetFilter};
pub use protocol::{BridgeCommand, BridgeResponse, ResponseStatus};
pub use server::BridgeServer;
