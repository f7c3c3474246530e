//! Per-channel accumulation of inbound bytes into complete messages.
//!
//! Every inbound channel appends into its own bounded [`Accumulator`]. A
//! newline completes a message. The [`IngestionMerger`] checks channels in a
//! fixed order (radio, network, serial) and publishes at most one message per
//! poll; anything else that completed stays buffered for later polls.

use std::fmt;

/// Accumulator size that triggers front trimming.
pub const ACCUMULATOR_CAP: usize = 4096;
/// Bytes kept after trimming.
pub const ACCUMULATOR_KEEP: usize = 2048;
/// Message terminator.
pub const TERMINATOR: u8 = b'\n';

/// Where inbound bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundChannel {
    Radio,
    Network,
    Serial,
}

impl InboundChannel {
    /// Polling precedence.
    pub const ALL: [InboundChannel; 3] = [Self::Radio, Self::Network, Self::Serial];

    fn index(self) -> usize {
        match self {
            Self::Radio => 0,
            Self::Network => 1,
            Self::Serial => 2,
        }
    }
}

impl fmt::Display for InboundChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Radio => f.write_str("radio"),
            Self::Network => f.write_str("network"),
            Self::Serial => f.write_str("serial"),
        }
    }
}

/// Bounded byte buffer for one channel.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    buf: Vec<u8>,
}

impl Accumulator {
    /// Appends `bytes`; past [`ACCUMULATOR_CAP`] the oldest bytes are dropped
    /// so the newest [`ACCUMULATOR_KEEP`] remain.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > ACCUMULATOR_CAP {
            let excess = self.buf.len() - ACCUMULATOR_KEEP;
            self.buf.drain(..excess);
        }
    }

    /// Removes the first complete message, without its terminator or a
    /// trailing carriage return.
    pub fn take_message(&mut self) -> Option<String> {
        let end = self.buf.iter().position(|&b| b == TERMINATOR)?;
        let mut message: Vec<u8> = self.buf.drain(..=end).collect();
        message.pop();
        if message.last() == Some(&b'\r') {
            message.pop();
        }
        Some(String::from_utf8_lossy(&message).into_owned())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// A completed inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveMessage {
    pub text: String,
    pub channel: InboundChannel,
}

/// The three channel accumulators polled in precedence order.
#[derive(Debug, Clone, Default)]
pub struct IngestionMerger {
    accumulators: [Accumulator; 3],
}

impl IngestionMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, channel: InboundChannel, bytes: &[u8]) {
        self.accumulators[channel.index()].push(bytes);
    }

    /// Bytes buffered for `channel`.
    pub fn pending(&self, channel: InboundChannel) -> usize {
        self.accumulators[channel.index()].len()
    }

    /// The first complete message in precedence order, if any.
    pub fn poll(&mut self) -> Option<LiveMessage> {
        InboundChannel::ALL.into_iter().find_map(|channel| {
            self.accumulators[channel.index()]
                .take_message()
                .map(|text| {
                    tracing::info!(channel = %channel, bytes = text.len(), "live message complete");
                    LiveMessage { text, channel }
                })
        })
    }
}
