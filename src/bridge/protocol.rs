//! Line protocol spoken between the marquee process and the radio bridge.
//!
//! One JSON object per line in each direction, one outstanding command at a
//! time. Commands are tagged by `cmd`:
//!
//! ```json
//! {"cmd":"config","name":"MatrixPanel"}
//! {"cmd":"connect"}
//! {"cmd":"write","payload":"Hello there.\n"}
//! {"cmd":"close"}
//! ```
//!
//! Every command is answered with a single response line:
//!
//! ```json
//! {"status":"ok","result":"connected"}
//! {"status":"error","error":"BLE target not found (name=Some(\"MatrixPanel\") address=None)"}
//! ```
//!
//! The helper may also emit one unsolicited `error` response on start-up
//! (for example when the radio stack is unavailable) and then exit.

use super::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A command sent to the bridge helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum BridgeCommand {
    /// Select the target by advertised name and/or explicit address.
    /// Does not connect.
    Config {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        address: Option<String>,
    },
    /// Discover and connect to the configured target.
    Connect,
    /// Acknowledged write of `payload` to the UART RX characteristic.
    Write { payload: String },
    /// Disconnect and terminate the helper.
    Close,
}

impl BridgeCommand {
    /// Short name used in logs and timeouts.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Connect => "connect",
            Self::Write { .. } => "write",
            Self::Close => "close",
        }
    }

    /// Serializes this command to a JSON line (with trailing newline).
    pub fn to_line(&self) -> Result<String, BridgeError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parses a command line received by the helper.
    pub fn parse(line: &str) -> Result<Self, BridgeError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(BridgeError::ProtocolError {
                message: "empty command line".to_owned(),
            });
        }
        serde_json::from_str(trimmed).map_err(|e| BridgeError::ProtocolError {
            message: format!("invalid command: {e}"),
        })
    }
}

/// Outcome tag of a [`BridgeResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// A response line from the bridge helper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BridgeResponse {
    /// Success carrying a result value.
    pub fn ok(result: impl Into<serde_json::Value>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            result: Some(result.into()),
            error: None,
        }
    }

    /// Failure carrying a message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            result: None,
            error: Some(message.into()),
        }
    }

    /// Serializes this response to a JSON line (with trailing newline).
    pub fn to_line(&self) -> Result<String, BridgeError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parses a response line received from the helper.
    pub fn parse(line: &str) -> Result<Self, BridgeError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(BridgeError::ProtocolError {
                message: "empty response line".to_owned(),
            });
        }
        serde_json::from_str(trimmed).map_err(|e| BridgeError::ProtocolError {
            message: format!("invalid response: {e}"),
        })
    }

    /// Converts an `error` status into [`BridgeError::Remote`].
    pub fn into_result(self) -> Result<Option<serde_json::Value>, BridgeError> {
        match self.status {
            ResponseStatus::Ok => Ok(self.result),
            ResponseStatus::Error => Err(BridgeError::Remote {
                message: self
                    .error
                    .unwrap_or_else(|| "unspecified bridge error".to_owned()),
            }),
        }
    }
}
