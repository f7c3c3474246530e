//! Error types for the radio bridge.

/// Errors raised while talking to, or inside, the radio bridge helper.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Failed to spawn the helper process.
    #[error("failed to spawn bridge helper: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// The helper did not answer in time.
    #[error("bridge command timed out after {timeout_secs}s")]
    Timeout {
        /// The timeout duration in seconds.
        timeout_secs: u64,
    },

    /// Line protocol violation.
    #[error("protocol error: {message}")]
    ProtocolError {
        /// Description of the protocol violation.
        message: String,
    },

    /// The helper answered with `status: error`.
    #[error("bridge reported error: {message}")]
    Remote {
        /// Error text from the helper.
        message: String,
    },

    /// The helper exited or closed its stdout.
    #[error("bridge helper exited (exit code: {exit_code:?})")]
    ProcessExited {
        /// The exit code, if available.
        exit_code: Option<i32>,
    },

    /// A response line exceeded the size bound.
    #[error("bridge output exceeded {max_bytes} bytes")]
    OutputTruncated {
        /// The maximum allowed line size.
        max_bytes: usize,
    },

    /// No peripheral matched the configured filter.
    #[error("BLE target not found (name={name:?} address={address:?})")]
    TargetNotFound {
        /// Advertised name filter.
        name: Option<String>,
        /// Explicit address filter.
        address: Option<String>,
    },

    /// Radio stack failure inside the helper.
    #[error("radio link error: {0}")]
    Link(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[source] serde_json::Error),
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}
