//! Model service client: availability probe and chat request.
//!
//! A probe returns a [`ProbeStatus`]:
//!
//! - [`Available`](ProbeStatus::Available): `/api/tags` answered with a model list
//! - [`NotRunning`](ProbeStatus::NotRunning): connection refused or unreachable
//! - [`Timeout`](ProbeStatus::Timeout): no answer within the probe deadline
//! - [`Unhealthy`](ProbeStatus::Unhealthy): answered with an HTTP error status
//! - [`IncompatibleResponse`](ProbeStatus::IncompatibleResponse): answered, but
//!   not with an Ollama tag list

use crate::config::LlmConfig;
use crate::error::{MarqueeError, Result};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// Stop sequence matching the prompt's control line.
pub const STOP_SEQUENCE: &str = "\nEND";

/// Status of the model service after probing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    /// Service is running; `models` lists the advertised names.
    Available { models: Vec<String>, latency_ms: u64 },
    NotRunning,
    Timeout,
    Unhealthy { status_code: u16, message: String },
    IncompatibleResponse { detail: String },
}

impl ProbeStatus {
    /// Returns `true` if the service answered with a model list.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }

    /// Returns `true` if `model` appears by exact name.
    pub fn has_model(&self, model: &str) -> bool {
        match self {
            Self::Available { models, .. } => models.iter().any(|m| m == model),
            _ => false,
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available { models, latency_ms } => {
                write!(f, "available ({latency_ms}ms, {} model(s))", models.len())
            }
            Self::NotRunning => write!(f, "not running (connection refused)"),
            Self::Timeout => write!(f, "timeout (no response)"),
            Self::Unhealthy {
                status_code,
                message,
            } => write!(f, "unhealthy (HTTP {status_code}): {message}"),
            Self::IncompatibleResponse { detail } => write!(f, "incompatible response: {detail}"),
        }
    }
}

/// Sampling options sent with every chat request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatOptions {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub repeat_penalty: f64,
    pub stop: Vec<String>,
    pub num_predict: u32,
}

impl ChatOptions {
    /// Options taken from the LLM configuration.
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            repeat_penalty: config.repeat_penalty,
            stop: vec![STOP_SEQUENCE.to_owned()],
            num_predict: config.num_predict,
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
    options: &'a ChatOptions,
}

/// HTTP client for an Ollama-compatible service.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    options: ChatOptions,
    probe_client: reqwest::Client,
    chat_client: reqwest::Client,
}

impl OllamaClient {
    /// Creates a client from the LLM configuration.
    pub fn new(config: &LlmConfig) -> Self {
        let probe_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout_secs))
            .build()
            .unwrap_or_default();
        let chat_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.chat_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            base_url: config.host.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            options: ChatOptions::from_config(config),
            probe_client,
            chat_client,
        }
    }

    /// Configured model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Queries `/api/tags`. Never fails; problems are reported as a status.
    pub async fn probe(&self) -> ProbeStatus {
        let url = format!("{}/api/tags", self.base_url);
        let start = Instant::now();
        let resp = match self.probe_client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => return classify_reqwest_error(&e),
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        let status_code = resp.status().as_u16();
        let success = resp.status().is_success();
        let body = resp.text().await.unwrap_or_default();

        if !success {
            return ProbeStatus::Unhealthy {
                status_code,
                message: body.chars().take(500).collect(),
            };
        }
        match parse_tags_response(&body) {
            Some(models) => ProbeStatus::Available { models, latency_ms },
            None => ProbeStatus::IncompatibleResponse {
                detail: "/api/tags did not return a model list".to_owned(),
            },
        }
    }

    /// Sends one non-streaming chat request and returns the reply text.
    ///
    /// # Errors
    ///
    /// Unreachable service, non-2xx status, non-JSON body, or a body with
    /// neither `message.content` nor `response`.
    pub async fn chat(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            options: &self.options,
        };

        let resp = self.chat_client.post(&url).json(&request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MarqueeError::Http(format!(
                "chat returned HTTP {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MarqueeError::Http(format!("chat body is not JSON: {e}")))?;
        extract_reply(&json)
            .map(str::to_owned)
            .ok_or_else(|| MarqueeError::Http("chat reply carried no text".to_owned()))
    }
}

/// `message.content`, else `response`.
fn extract_reply(json: &serde_json::Value) -> Option<&str> {
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(serde_json::Value::as_str)
        .or_else(|| json.get("response").and_then(serde_json::Value::as_str))
}

fn classify_reqwest_error(err: &reqwest::Error) -> ProbeStatus {
    if err.is_timeout() {
        ProbeStatus::Timeout
    } else if err.is_connect() {
        ProbeStatus::NotRunning
    } else {
        ProbeStatus::IncompatibleResponse {
            detail: format!("transport error: {err}"),
        }
    }
}

/// Parses `{"models": [{"name": "llama3:8b", ...}, ...]}`.
fn parse_tags_response(body: &str) -> Option<Vec<String>> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let models = json.get("models")?.as_array()?;
    Some(
        models
            .iter()
            .filter_map(|m| m.get("name")?.as_str().map(str::to_owned))
            .collect(),
    )
}
