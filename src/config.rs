//! Configuration for the generation daemon, transports and panel runtime.
//!
//! Values come from built-in defaults, an optional TOML file, and finally
//! environment overrides using the variable names the display tooling has
//! always used (`OLLAMA_HOST`, `TRANSPORT`, `SERIAL_PORT`, ...).

use crate::error::{MarqueeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hard upper bound on the wrapped line width the panel can show without
/// clipping, regardless of `panel_cols`.
pub const DEVICE_MAX_WIDTH: usize = 19;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarqueeConfig {
    /// Seconds between generation cycles.
    pub interval_secs: u64,
    /// Language model service settings.
    pub llm: LlmConfig,
    /// Outbound transport settings.
    pub transport: TransportConfig,
    /// Payload shaping settings.
    pub display: DisplayConfig,
    /// Panel runtime settings (device side).
    pub panel: PanelConfig,
}

impl Default for MarqueeConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            llm: LlmConfig::default(),
            transport: TransportConfig::default(),
            display: DisplayConfig::default(),
            panel: PanelConfig::default(),
        }
    }
}

/// Language model service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the model service.
    pub host: String,
    /// Model identifier that must appear in the service's model list.
    pub model: String,
    /// Command-line tool used when the service path fails.
    pub cli_program: String,
    /// Timeout for the availability probe.
    pub probe_timeout_secs: u64,
    /// Timeout for the chat request.
    pub chat_timeout_secs: u64,
    /// Wall-clock limit for the CLI fallback.
    pub cli_timeout_secs: u64,
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus sampling threshold.
    pub top_p: f64,
    /// Top-k sampling.
    pub top_k: u32,
    /// Repetition penalty.
    pub repeat_penalty: f64,
    /// Generation headroom in model tokens; the formatter trims afterwards.
    pub num_predict: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: "http://127.0.0.1:11434".to_owned(),
            model: "mistral:7b-instruct".to_owned(),
            cli_program: "ollama".to_owned(),
            probe_timeout_secs: 3,
            chat_timeout_secs: 120,
            cli_timeout_secs: 180,
            temperature: 0.45,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.5,
            num_predict: 64,
        }
    }
}

/// Which transport delivers payloads to the panel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Short-range radio through the bridge helper.
    #[default]
    #[serde(alias = "ble")]
    Radio,
    /// HTTP POST to the panel's endpoint.
    #[serde(alias = "http")]
    Network,
    /// Direct serial link.
    #[serde(alias = "usb")]
    Serial,
}

impl TransportKind {
    /// Parses the `TRANSPORT` environment value (case-insensitive).
    pub fn from_env_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BLE" | "RADIO" => Some(Self::Radio),
            "HTTP" | "NETWORK" => Some(Self::Network),
            "USB" | "SERIAL" => Some(Self::Serial),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Radio => "radio",
            Self::Network => "network",
            Self::Serial => "serial",
        };
        f.write_str(label)
    }
}

/// Transport selection plus per-transport settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// The active transport, chosen once at start-up.
    pub kind: TransportKind,
    /// Radio bridge settings.
    pub radio: RadioConfig,
    /// Network endpoint settings.
    pub network: NetworkConfig,
    /// Serial link settings.
    pub serial: SerialConfig,
}

/// Radio bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Advertised peripheral name to match during discovery.
    pub name: Option<String>,
    /// Explicit peripheral: platform id (a UUID on macOS) or MAC address.
    /// Skips scanning when set.
    pub address: Option<String>,
    /// Helper executable. `None` looks next to the current executable, then on `PATH`.
    pub bridge_program: Option<PathBuf>,
    /// Deadline for a single bridge command round trip.
    pub command_timeout_secs: u64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            name: Some("MatrixPanel".to_owned()),
            address: None,
            bridge_program: None,
            command_timeout_secs: 45,
        }
    }
}

/// Network transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Panel endpoint, e.g. `http://172.20.10.5/post`.
    pub url: Option<String>,
    /// Request timeout.
    pub timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 10,
        }
    }
}

/// Serial transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port path, e.g. `/dev/cu.usbserial-0001`.
    pub port: Option<String>,
    /// Baud rate.
    pub baud: u32,
    /// Write timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: 115_200,
            timeout_ms: 2_000,
        }
    }
}

/// Payload shaping limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Configured column count of the panel (128 px / 6 px per glyph).
    pub panel_cols: usize,
    /// Maximum word tokens in a payload.
    pub max_tokens: usize,
    /// Maximum wrapped lines in a payload.
    pub max_lines: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            panel_cols: 21,
            max_tokens: 28,
            max_lines: 6,
        }
    }
}

impl DisplayConfig {
    /// Column width actually used for wrapping.
    pub fn effective_width(&self) -> usize {
        self.panel_cols.min(DEVICE_MAX_WIDTH)
    }
}

/// Panel runtime configuration (the device side).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Address the inbound HTTP endpoint binds to.
    pub bind_addr: String,
    /// Surface width in pixels.
    pub width: u16,
    /// Surface height in pixels.
    pub height: u16,
    /// Idle dwell before re-running the sequence on canned content.
    pub idle_secs: u64,
    /// Wall-clock budget of the dissolve.
    pub dissolve_ms: u64,
    /// Pause between dissolve and the thinking indicator.
    pub pause_ms: u64,
    /// Duration of the thinking indicator.
    pub thinking_ms: u64,
    /// Per-character reveal interval.
    pub reveal_char_ms: u64,
    /// Hold after the reveal completes.
    pub done_ms: u64,
    /// Cursor blink half-period.
    pub cursor_blink_ms: u64,
    /// Dissolve block edge in pixels.
    pub block_size: u16,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_owned(),
            width: 128,
            height: 64,
            idle_secs: 60,
            dissolve_ms: 1_500,
            pause_ms: 1_000,
            thinking_ms: 10_000,
            reveal_char_ms: 30,
            done_ms: 2_000,
            cursor_blink_ms: 500,
            block_size: 4,
        }
    }
}

impl PanelConfig {
    /// Converts the millisecond fields into sequencer timing.
    pub fn timing(&self) -> crate::device::sequencer::SequencerTiming {
        crate::device::sequencer::SequencerTiming {
            idle: Duration::from_secs(self.idle_secs),
            dissolve: Duration::from_millis(self.dissolve_ms),
            pause: Duration::from_millis(self.pause_ms),
            thinking: Duration::from_millis(self.thinking_ms),
            reveal_char: Duration::from_millis(self.reveal_char_ms),
            done: Duration::from_millis(self.done_ms),
            cursor_blink: Duration::from_millis(self.cursor_blink_ms),
            block_size: self.block_size.max(1),
        }
    }
}

impl MarqueeConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| MarqueeError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| MarqueeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/marquee/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = dirs::config_dir() {
            config.join("marquee").join("config.toml")
        } else {
            PathBuf::from("/tmp/marquee-config/config.toml")
        }
    }

    /// Full start-up load: defaults, then the TOML file (explicit path or the
    /// default path when it exists), then process environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error for unreadable files, bad TOML or bad environment values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Self::default_config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies environment overrides through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`MarqueeError::Config`] when a numeric variable does not parse.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("OLLAMA_HOST") {
            self.llm.host = v;
        }
        if let Some(v) = lookup("OLLAMA_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("TRANSPORT") {
            match TransportKind::from_env_value(&v) {
                Some(kind) => self.transport.kind = kind,
                None => {
                    tracing::warn!(value = %v, "unknown TRANSPORT value, using radio");
                    self.transport.kind = TransportKind::Radio;
                }
            }
        }
        if let Some(v) = lookup("BLE_NAME") {
            self.transport.radio.name = non_empty(v);
        }
        if let Some(v) = lookup("BLE_ADDRESS") {
            self.transport.radio.address = non_empty(v);
        }
        if let Some(v) = lookup("MARQUEE_BRIDGE_PROGRAM") {
            self.transport.radio.bridge_program = non_empty(v).map(PathBuf::from);
        }
        if let Some(v) = lookup("ESP32_URL") {
            self.transport.network.url = non_empty(v);
        }
        if let Some(v) = lookup("SERIAL_PORT") {
            self.transport.serial.port = non_empty(v);
        }
        if let Some(v) = lookup("SERIAL_BAUD") {
            self.transport.serial.baud = parse_env("SERIAL_BAUD", &v)?;
        }
        if let Some(v) = lookup("INTERVAL_S") {
            self.interval_secs = parse_env("INTERVAL_S", &v)?;
        }
        if let Some(v) = lookup("PANEL_COLS") {
            self.display.panel_cols = parse_env("PANEL_COLS", &v)?;
        }
        if let Some(v) = lookup("MAX_TOKENS") {
            self.display.max_tokens = parse_env("MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("MAX_LINES") {
            self.display.max_lines = parse_env("MAX_LINES", &v)?;
        }
        Ok(())
    }

    /// Checks that the selected transport has what it needs.
    ///
    /// # Errors
    ///
    /// Returns [`MarqueeError::Config`] naming the missing setting.
    pub fn validate(&self) -> Result<()> {
        match self.transport.kind {
            TransportKind::Network if self.transport.network.url.is_none() => Err(
                MarqueeError::Config("set ESP32_URL for the network transport".to_owned()),
            ),
            TransportKind::Serial if self.transport.serial.port.is_none() => Err(
                MarqueeError::Config("set SERIAL_PORT for the serial transport".to_owned()),
            ),
            // Radio with neither name nor address scans by UART service UUID.
            _ => Ok(()),
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| MarqueeError::Config(format!("{key} is not a valid number: {value:?}")))
}
