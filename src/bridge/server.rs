//! Helper side of the radio bridge.
//!
//! Reads newline-delimited [`BridgeCommand`]s, runs them against a
//! [`RadioLink`], and writes one [`BridgeResponse`] line per command. The
//! loop ends on `close` or when the input reaches EOF.
//!
//! Stdout is reserved for the protocol; diagnostics go to stderr.

use super::error::BridgeError;
use super::link::{RadioLink, SCAN_TIMEOUT, TargetFilter};
use super::protocol::{BridgeCommand, BridgeResponse};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum accepted command line length.
const MAX_LINE_BYTES: usize = 16 * 1024;

/// Drops every byte outside 7-bit ASCII.
pub fn ascii_payload(payload: &str) -> Vec<u8> {
    payload.bytes().filter(u8::is_ascii).collect()
}

/// One radio session driven by bridge commands.
pub struct BridgeServer<L> {
    link: L,
    filter: TargetFilter,
    /// Cached peripheral id or address. Cleared when it stops working.
    target: Option<String>,
    scan_timeout: Duration,
}

impl<L: RadioLink> BridgeServer<L> {
    /// Wraps `link` with an empty filter and the default scan budget.
    pub fn new(link: L) -> Self {
        Self {
            link,
            filter: TargetFilter::default(),
            target: None,
            scan_timeout: SCAN_TIMEOUT,
        }
    }

    /// Overrides the scan budget.
    pub fn with_scan_timeout(mut self, scan: Duration) -> Self {
        self.scan_timeout = scan;
        self
    }

    /// Returns the wrapped link.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Runs the command loop until `close` or EOF.
    pub async fn serve<R, W>(&mut self, mut reader: R, mut writer: W) -> Result<(), BridgeError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader
                .read_line(&mut line)
                .await
                .map_err(|e| BridgeError::ProtocolError {
                    message: format!("failed to read command: {e}"),
                })?;

            if n == 0 {
                tracing::info!("stdin closed (EOF); shutting down radio bridge");
                self.link.disconnect().await;
                return Ok(());
            }
            if line.trim().is_empty() {
                continue;
            }

            let (response, is_close) = if line.len() > MAX_LINE_BYTES {
                (
                    BridgeResponse::error(format!("command exceeded {MAX_LINE_BYTES} bytes")),
                    false,
                )
            } else {
                match BridgeCommand::parse(&line) {
                    Ok(command) => {
                        let is_close = command == BridgeCommand::Close;
                        (self.handle(command).await, is_close)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "rejecting bridge command");
                        (BridgeResponse::error(e.to_string()), false)
                    }
                }
            };

            write_response(&mut writer, &response).await?;

            if is_close {
                tracing::info!("close received; shutting down radio bridge");
                return Ok(());
            }
        }
    }

    /// Runs a single command and builds its response.
    pub async fn handle(&mut self, command: BridgeCommand) -> BridgeResponse {
        let cmd_name = command.name();
        let outcome = match command {
            BridgeCommand::Config { name, address } => {
                self.filter = TargetFilter { name, address };
                self.target = self.filter.address.clone();
                Ok(serde_json::Value::from("configured"))
            }
            BridgeCommand::Connect => self
                .ensure_connected()
                .await
                .map(|()| serde_json::Value::from("connected")),
            BridgeCommand::Write { payload } => self
                .write(&payload)
                .await
                .map(|written| serde_json::json!({ "bytes": written })),
            BridgeCommand::Close => {
                self.link.disconnect().await;
                Ok(serde_json::Value::from("closed"))
            }
        };

        match outcome {
            Ok(result) => BridgeResponse::ok(result),
            Err(e) => {
                tracing::warn!(cmd = cmd_name, error = %e, "bridge command failed");
                BridgeResponse::error(e.to_string())
            }
        }
    }

    /// Connects unless already connected.
    ///
    /// A cached target that refuses the connection is discarded, the filter
    /// is re-scanned, and one more connection attempt is made.
    async fn ensure_connected(&mut self) -> Result<(), BridgeError> {
        if self.link.is_connected().await {
            return Ok(());
        }

        let target = self.resolve_target().await?;
        self.link.disconnect().await;

        if let Err(e) = self.link.connect(&target).await {
            tracing::warn!(peripheral = %target, error = %e, "connect failed; rescanning");
            self.target = None;
            let target = self.resolve_target().await?;
            self.link.connect(&target).await?;
        }

        if !self.link.is_connected().await {
            return Err(BridgeError::Link("BLE connect failed".to_owned()));
        }
        tracing::info!(peripheral = ?self.target, "peripheral connected");
        Ok(())
    }

    async fn resolve_target(&mut self) -> Result<String, BridgeError> {
        if let Some(target) = &self.target {
            return Ok(target.clone());
        }
        let found = self.link.discover(&self.filter, self.scan_timeout).await?;
        self.target = Some(found.clone());
        Ok(found)
    }

    /// Writes once; on failure invalidates the connection, reconnects and
    /// retries exactly once.
    async fn write(&mut self, payload: &str) -> Result<usize, BridgeError> {
        self.ensure_connected().await?;
        let data = ascii_payload(payload);

        if let Err(e) = self.link.write(&data).await {
            tracing::warn!(error = %e, "write failed; reconnecting for one retry");
            self.link.disconnect().await;
            self.target = None;
            self.ensure_connected().await?;
            self.link.write(&data).await?;
        }
        Ok(data.len())
    }
}

/// Writes one response line and flushes.
pub async fn write_response<W>(writer: &mut W, response: &BridgeResponse) -> Result<(), BridgeError>
where
    W: AsyncWrite + Unpin,
{
    let line = response.to_line()?;
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| BridgeError::ProtocolError {
            message: format!("failed to write response: {e}"),
        })?;
    writer
        .flush()
        .await
        .map_err(|e| BridgeError::ProtocolError {
            message: format!("failed to flush response: {e}"),
        })
}
