//! Caller side of the radio bridge.
//!
//! [`RadioBridge`] owns one long-lived helper process and its two pipe
//! endpoints behind a single [`tokio::sync::Mutex`], so a reconnect-and-retry
//! sequence can never interleave with another command. The helper is spawned
//! lazily and configured on first use; `write` connects on demand.
//!
//! Failure handling:
//!
//! - an `error` response marks the link as not connected, so the next write
//!   reconnects;
//! - EOF, broken pipe, timeout or a garbled line discards the helper entirely,
//!   and the next command spawns a fresh one;
//! - an error line the helper emits on start-up (for example when the radio
//!   stack is missing) is surfaced as the first failure.

use super::error::BridgeError;
use super::protocol::{BridgeCommand, BridgeResponse};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Default helper executable name.
pub const DEFAULT_HELPER: &str = "marquee-radio-bridge";

/// Maximum number of bytes accepted per response line.
const MAX_LINE_BYTES: usize = 16 * 1024;

/// How long to wait for an exit status once stdout has closed.
const EXIT_GRACE: Duration = Duration::from_millis(250);

/// How to launch and address the bridge helper.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Helper executable.
    pub program: PathBuf,
    /// Extra arguments passed to the helper.
    pub args: Vec<String>,
    /// Advertised name filter sent with `config`.
    pub name: Option<String>,
    /// Explicit address sent with `config`.
    pub address: Option<String>,
    /// Deadline for one command round trip.
    pub command_timeout: Duration,
}

impl BridgeSettings {
    /// Settings for `program` with no target filter and a 45 s deadline.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            name: None,
            address: None,
            command_timeout: Duration::from_secs(45),
        }
    }

    /// Sets the advertised name filter.
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// Sets the explicit address.
    pub fn with_address(mut self, address: Option<String>) -> Self {
        self.address = address;
        self
    }

    /// Sets helper arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the per-command deadline.
    pub fn with_command_timeout(mut self, deadline: Duration) -> Self {
        self.command_timeout = deadline;
        self
    }
}

/// Finds the helper executable.
///
/// An explicit path wins; otherwise a sibling of the running executable,
/// then a `PATH` lookup, then the bare name.
pub fn resolve_helper_program(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(exe) = std::env::current_exe() {
        let sibling = exe.with_file_name(DEFAULT_HELPER);
        if sibling.is_file() {
            return sibling;
        }
    }
    which::which(DEFAULT_HELPER).unwrap_or_else(|_| PathBuf::from(DEFAULT_HELPER))
}

/// A spawned helper with its pipes.
///
/// The child is killed when this value is dropped.
struct BridgeProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    /// Set while a command waits for its answer. Still set once the request
    /// is over means the caller was dropped mid-command and the answer may
    /// be sitting unread in the pipe.
    in_flight: bool,
}

impl BridgeProcess {
    fn spawn(settings: &BridgeSettings) -> Result<Self, BridgeError> {
        let mut child = Command::new(&settings.program)
            .args(&settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(BridgeError::SpawnFailed)?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.start_kill();
            return Err(BridgeError::ProtocolError {
                message: "bridge helper stdio not piped".to_owned(),
            });
        };

        tracing::debug!(
            program = %settings.program.display(),
            pid = child.id(),
            "spawned radio bridge helper"
        );

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            in_flight: false,
        })
    }

    /// Sends one command and waits for its response.
    async fn request(
        &mut self,
        command: &BridgeCommand,
        deadline: Duration,
    ) -> Result<Option<serde_json::Value>, BridgeError> {
        let line = command.to_line()?;
        tracing::debug!(cmd = command.name(), "sending bridge command");
        self.in_flight = true;

        if let Err(e) = self.write_line(&line).await {
            // A helper that failed on start-up has usually written its reason
            // before exiting; prefer that over the bare broken pipe.
            if let Ok(Ok(response)) = timeout(EXIT_GRACE, self.read_response()).await {
                response.into_result()?;
            }
            return Err(e);
        }

        let response = timeout(deadline, self.read_response())
            .await
            .map_err(|_| BridgeError::Timeout {
                timeout_secs: deadline.as_secs(),
            })??;
        self.in_flight = false;
        response.into_result()
    }

    async fn write_line(&mut self, line: &str) -> Result<(), BridgeError> {
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(map_write_error)?;
        self.stdin.flush().await.map_err(map_write_error)
    }

    async fn read_response(&mut self) -> Result<BridgeResponse, BridgeError> {
        let mut line = String::new();
        let n = self
            .stdout
            .read_line(&mut line)
            .await
            .map_err(|e| BridgeError::ProtocolError {
                message: format!("stdout read error: {e}"),
            })?;

        if n == 0 {
            return Err(BridgeError::ProcessExited {
                exit_code: self.exit_code().await,
            });
        }

        if line.len() > MAX_LINE_BYTES {
            return Err(BridgeError::OutputTruncated {
                max_bytes: MAX_LINE_BYTES,
            });
        }

        BridgeResponse::parse(&line)
    }

    async fn exit_code(&mut self) -> Option<i32> {
        match timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => status.code(),
            _ => None,
        }
    }

    async fn shutdown(mut self, deadline: Duration) {
        if self.in_flight {
            tracing::debug!("bridge helper has an unanswered command; killing it");
        } else if let Err(e) = self.request(&BridgeCommand::Close, deadline).await {
            tracing::warn!(error = %e, "bridge close failed");
        }
        if timeout(EXIT_GRACE, self.child.wait()).await.is_ok() {
            return;
        }
        if let Err(e) = self.child.kill().await {
            tracing::debug!(error = %e, "failed to kill bridge helper");
        }
    }
}

impl Drop for BridgeProcess {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}

/// Maps a stdin write error to `ProcessExited` (broken pipe) or `ProtocolError`.
fn map_write_error(e: std::io::Error) -> BridgeError {
    if e.kind() == std::io::ErrorKind::BrokenPipe {
        tracing::warn!("stdin broken pipe, bridge helper exited");
        BridgeError::ProcessExited { exit_code: None }
    } else {
        BridgeError::ProtocolError {
            message: format!("stdin write error: {e}"),
        }
    }
}

#[derive(Default)]
struct BridgeState {
    process: Option<BridgeProcess>,
    connected: bool,
}

/// Drops a helper whose last command was abandoned before its answer was
/// read; its stale answer would otherwise pair with the next command.
fn discard_abandoned(state: &mut BridgeState) {
    if state.process.as_ref().is_some_and(|p| p.in_flight) {
        tracing::warn!("discarding bridge helper left mid-command");
        state.process = None;
        state.connected = false;
    }
}

/// Serialized command interface to the radio bridge helper.
pub struct RadioBridge {
    settings: BridgeSettings,
    state: Mutex<BridgeState>,
}

impl std::fmt::Debug for RadioBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioBridge")
            .field("program", &self.settings.program)
            .field("name", &self.settings.name)
            .field("address", &self.settings.address)
            .finish()
    }
}

impl RadioBridge {
    /// Creates an idle bridge handle. Nothing is spawned until first use.
    pub fn new(settings: BridgeSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(BridgeState::default()),
        }
    }

    /// Returns `true` if the last command left the link connected.
    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    /// Connects to the configured peripheral.
    pub async fn connect(&self) -> Result<(), BridgeError> {
        let mut state = self.state.lock().await;
        self.ensure_connected(&mut state).await
    }

    /// Writes `payload`, connecting first if needed.
    pub async fn write(&self, payload: &str) -> Result<(), BridgeError> {
        let mut state = self.state.lock().await;
        self.ensure_connected(&mut state).await?;
        let command = BridgeCommand::Write {
            payload: payload.to_owned(),
        };
        self.run(&mut state, &command).await.map(|_| ())
    }

    /// Asks the helper to disconnect and exit. Best-effort; errors are logged.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.connected = false;
        if let Some(process) = state.process.take() {
            process.shutdown(self.settings.command_timeout).await;
            tracing::info!("radio bridge closed");
        }
    }

    async fn ensure_connected(&self, state: &mut BridgeState) -> Result<(), BridgeError> {
        discard_abandoned(state);
        if state.connected && state.process.is_some() {
            return Ok(());
        }
        self.run(state, &BridgeCommand::Connect).await?;
        state.connected = true;
        tracing::info!(
            name = ?self.settings.name,
            address = ?self.settings.address,
            "radio bridge connected"
        );
        Ok(())
    }

    /// Runs one command, spawning and configuring the helper first if needed.
    async fn run(
        &self,
        state: &mut BridgeState,
        command: &BridgeCommand,
    ) -> Result<Option<serde_json::Value>, BridgeError> {
        let result = self.run_inner(state, command).await;
        if let Err(e) = &result {
            state.connected = false;
            if !matches!(e, BridgeError::Remote { .. }) {
                state.process = None;
            }
            tracing::warn!(cmd = command.name(), error = %e, "bridge command failed");
        }
        result
    }

    async fn run_inner(
        &self,
        state: &mut BridgeState,
        command: &BridgeCommand,
    ) -> Result<Option<serde_json::Value>, BridgeError> {
        let deadline = self.settings.command_timeout;
        discard_abandoned(state);
        if state.process.is_none() {
            let mut process = BridgeProcess::spawn(&self.settings)?;
            let config = BridgeCommand::Config {
                name: self.settings.name.clone(),
                address: self.settings.address.clone(),
            };
            // A start-up error line is read here as the config answer.
            process.request(&config, deadline).await?;
            state.process = Some(process);
        }

        match state.process.as_mut() {
            Some(process) => process.request(command, deadline).await,
            None => Err(BridgeError::ProcessExited { exit_code: None }),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn sh(script: &str) -> BridgeSettings {
        BridgeSettings::new("sh")
            .with_args(["-c", script])
            .with_name(Some("MatrixPanel".to_owned()))
            .with_command_timeout(Duration::from_secs(5))
    }

    const ALWAYS_OK: &str = r#"
while IFS= read -r line; do
    printf '{"status":"ok"}\n'
    case "$line" in *'"close"'*) exit 0;; esac
done
"#;

    #[tokio::test]
    async fn write_auto_connects() {
        let bridge = RadioBridge::new(sh(ALWAYS_OK));
        assert!(!bridge.is_connected().await);
        bridge.write("Hello there.\n").await.expect("write");
        assert!(bridge.is_connected().await);
        bridge.close().await;
        assert!(!bridge.is_connected().await);
    }

    #[tokio::test]
    async fn startup_error_is_first_failure() {
        let script = r#"printf '{"status":"error","error":"radio stack unavailable"}\n'; exit 1"#;
        let bridge = RadioBridge::new(sh(script));
        let err = bridge.write("x\n").await.unwrap_err();
        match err {
            BridgeError::Remote { message } => assert!(message.contains("radio stack unavailable")),
            other => panic!("expected Remote, got {other:?}"),
        }
        assert!(!bridge.is_connected().await);
    }

    #[tokio::test]
    async fn dead_helper_is_reported_not_hung() {
        let bridge = RadioBridge::new(sh("exit 3"));
        let err = bridge.connect().await.unwrap_err();
        assert!(
            matches!(err, BridgeError::ProcessExited { .. }),
            "expected ProcessExited, got {err:?}"
        );
    }

    #[tokio::test]
    async fn missing_helper_fails_to_spawn() {
        let settings = BridgeSettings::new("/nonexistent/marquee-radio-bridge");
        let bridge = RadioBridge::new(settings);
        let err = bridge.connect().await.unwrap_err();
        assert!(matches!(err, BridgeError::SpawnFailed(_)));
    }

    #[tokio::test]
    async fn silent_helper_times_out() {
        let settings = sh("sleep 60").with_command_timeout(Duration::from_millis(100));
        let bridge = RadioBridge::new(settings);
        let err = bridge.connect().await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { .. }));
    }

    #[tokio::test]
    async fn remote_write_error_marks_disconnected_and_reconnects() {
        // config ok, connect ok, first write fails, then everything succeeds.
        let script = r#"
writes=0
while IFS= read -r line; do
    case "$line" in
        *'"write"'*)
            writes=$((writes+1))
            if [ "$writes" -eq 1 ]; then
                printf '{"status":"error","error":"write failed"}\n'
            else
                printf '{"status":"ok"}\n'
            fi;;
        *) printf '{"status":"ok"}\n';;
    esac
done
"#;
        let bridge = RadioBridge::new(sh(script));
        let err = bridge.write("one\n").await.unwrap_err();
        assert!(matches!(err, BridgeError::Remote { .. }));
        assert!(!bridge.is_connected().await);

        bridge.write("two\n").await.expect("second write");
        assert!(bridge.is_connected().await);
    }

    #[tokio::test]
    async fn close_tolerates_error_answer() {
        let script = r#"
while IFS= read -r line; do
    case "$line" in
        *'"close"'*) printf '{"status":"error","error":"disconnect failed"}\n'; exit 0;;
        *) printf '{"status":"ok"}\n';;
    esac
done
"#;
        let bridge = RadioBridge::new(sh(script));
        bridge.connect().await.expect("connect");
        tokio::time::timeout(Duration::from_secs(5), bridge.close())
            .await
            .expect("close finished");
        assert!(!bridge.is_connected().await);
    }

    #[tokio::test]
    async fn abandoned_command_respawns_helper() {
        let dir = tempfile::tempdir().unwrap();
        let spawns = dir.path().join("spawns");
        let script = format!(
            r#"
echo spawn >> '{}'
while IFS= read -r line; do
    case "$line" in
        *'"write"'*) sleep 1; printf '{{"status":"ok","result":"late"}}\n';;
        *) printf '{{"status":"ok"}}\n';;
    esac
done
"#,
            spawns.display()
        );
        let bridge = RadioBridge::new(sh(&script));
        bridge.connect().await.expect("connect");

        // The caller gives up while the helper is still working on the write.
        let abandoned = tokio::time::timeout(Duration::from_millis(100), bridge.write("slow\n")).await;
        assert!(abandoned.is_err());

        // The helper holding the late answer is replaced, not reused.
        bridge.connect().await.expect("reconnect");
        let log = std::fs::read_to_string(&spawns).unwrap();
        assert_eq!(log.lines().count(), 2);
        bridge.close().await;
    }

    #[tokio::test]
    async fn garbled_response_is_protocol_error() {
        let script = r#"while IFS= read -r line; do echo "not json"; done"#;
        let bridge = RadioBridge::new(sh(script));
        let err = bridge.connect().await.unwrap_err();
        assert!(matches!(err, BridgeError::ProtocolError { .. }));
    }

    #[test]
    fn explicit_helper_path_wins() {
        let path = Path::new("/opt/bridge");
        assert_eq!(resolve_helper_program(Some(path)), PathBuf::from("/opt/bridge"));
    }

    #[test]
    fn bridge_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RadioBridge>();
    }
}
