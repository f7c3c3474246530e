//! Background loop: generate, format, deliver, sleep.
//!
//! Each cycle is isolated. A failed generation or delivery is logged and the
//! loop carries on after the interval; nothing short of cancellation stops it.

use crate::config::{DisplayConfig, MarqueeConfig};
use crate::error::{MarqueeError, Result};
use crate::format::{FormattedPayload, format_response};
use crate::generator::{GenerationPath, Generator};
use crate::transport::{self, DeliveryReceipt, Transport};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What one successful cycle produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub path: GenerationPath,
    pub payload: FormattedPayload,
    pub receipt: DeliveryReceipt,
}

/// Owns the generator and the single active transport.
pub struct Daemon {
    generator: Generator,
    transport: Box<dyn Transport>,
    display: DisplayConfig,
    interval: Duration,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("transport", &self.transport.kind())
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Daemon {
    /// Validates `config` and builds the generator and transport.
    ///
    /// # Errors
    ///
    /// Returns [`MarqueeError::Config`] when the selected transport is missing
    /// its endpoint.
    pub fn from_config(config: &MarqueeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            Generator::new(&config.llm),
            transport::from_config(&config.transport)?,
            config.display.clone(),
            Duration::from_secs(config.interval_secs),
        ))
    }

    pub fn new(
        generator: Generator,
        transport: Box<dyn Transport>,
        display: DisplayConfig,
        interval: Duration,
    ) -> Self {
        Self {
            generator,
            transport,
            display,
            interval,
        }
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Start-up warm-up. Failures are logged; the first delivery retries.
    pub async fn prepare(&self) {
        match self.transport.prepare().await {
            Ok(()) => info!(transport = %self.transport.kind(), "transport ready"),
            Err(e) => warn!(
                transport = %self.transport.kind(),
                error = %e,
                "transport warm-up failed, will retry on first delivery"
            ),
        }
    }

    /// Shapes raw model output with the configured limits.
    pub fn format(&self, raw: &str) -> FormattedPayload {
        format_response(
            raw,
            self.display.max_tokens,
            self.display.max_lines,
            self.display.effective_width(),
        )
    }

    /// One generate, format and deliver pass.
    ///
    /// # Errors
    ///
    /// Returns the generation or delivery error; an output with no usable
    /// text is a generation error.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let generated = self.generator.generate().await?;
        let payload = self.format(&generated.text);
        info!(
            path = %generated.path,
            lines = payload.line_count(),
            "processed model output"
        );
        if payload.is_empty() {
            return Err(MarqueeError::Generation(
                "model output had no usable text".to_owned(),
            ));
        }
        info!(payload = %payload.text(), "payload");

        let receipt = self.transport.deliver(&payload).await?;
        info!(receipt = %receipt, "delivered");
        Ok(CycleReport {
            path: generated.path,
            payload,
            receipt,
        })
    }

    /// Runs cycles until `cancel` fires, then shuts the transport down.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            transport = %self.transport.kind(),
            interval_secs = self.interval.as_secs(),
            "marquee loop started"
        );
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                result = self.run_cycle() => {
                    if let Err(e) = result {
                        warn!(error = %e, "cycle failed");
                    }
                }
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("marquee loop cancelled");
        self.shutdown().await;
    }

    /// Best-effort release of the transport.
    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::{LlmConfig, TransportKind};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Records payloads; fails when `fail` is set.
    #[derive(Default, Clone)]
    struct RecordingTransport {
        delivered: Arc<Mutex<Vec<String>>>,
        shut_down: Arc<Mutex<bool>>,
        fail: bool,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Network
        }

        async fn deliver(&self, payload: &FormattedPayload) -> Result<DeliveryReceipt> {
            if self.fail {
                return Err(MarqueeError::Transport("panel returned HTTP 500".to_owned()));
            }
            let wire = payload.to_wire();
            let bytes = wire.len();
            self.delivered.lock().unwrap().push(wire);
            Ok(DeliveryReceipt {
                transport: TransportKind::Network,
                bytes,
            })
        }

        async fn shutdown(&self) {
            *self.shut_down.lock().unwrap() = true;
        }
    }

    async fn service_replying(reply: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{ "name": "mistral:7b-instruct" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": { "role": "assistant", "content": reply }
            })))
            .mount(&server)
            .await;
        server
    }

    fn daemon(host: String, transport: RecordingTransport) -> Daemon {
        let llm = LlmConfig {
            host,
            model: "mistral:7b-instruct".to_owned(),
            cli_program: "false".to_owned(),
            cli_timeout_secs: 2,
            ..LlmConfig::default()
        };
        Daemon::new(
            Generator::new(&llm),
            Box::new(transport),
            DisplayConfig::default(),
            Duration::from_millis(20),
        )
    }

    #[tokio::test]
    async fn cycle_formats_and_delivers() {
        let server = service_replying("Kettles sing of rain. Then more.\nEND").await;
        let transport = RecordingTransport::default();
        let daemon = daemon(server.uri(), transport.clone());

        let report = daemon.run_cycle().await.unwrap();
        assert_eq!(report.path, GenerationPath::Service);
        assert_eq!(report.payload.lines(), ["Kettles sing of", "rain."]);
        assert_eq!(report.receipt.bytes, "Kettles sing of rain.\n".len());
        assert_eq!(
            transport.delivered.lock().unwrap().as_slice(),
            ["Kettles sing of rain.\n"]
        );
    }

    #[tokio::test]
    async fn empty_output_is_not_delivered() {
        let server = service_replying("\nEND\n").await;
        let transport = RecordingTransport::default();
        let daemon = daemon(server.uri(), transport.clone());

        let err = daemon.run_cycle().await.unwrap_err();
        assert!(matches!(err, MarqueeError::Generation(_)));
        assert!(transport.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_is_surfaced() {
        let server = service_replying("Hi.").await;
        let transport = RecordingTransport {
            fail: true,
            ..RecordingTransport::default()
        };
        let err = daemon(server.uri(), transport).run_cycle().await.unwrap_err();
        assert!(matches!(err, MarqueeError::Transport(_)));
    }

    #[tokio::test]
    async fn loop_survives_failures_and_shuts_down_on_cancel() {
        let transport = RecordingTransport {
            fail: true,
            ..RecordingTransport::default()
        };
        let daemon = Arc::new(daemon("http://127.0.0.1:1".to_owned(), transport.clone()));
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let daemon = Arc::clone(&daemon);
            let cancel = cancel.clone();
            async move { daemon.run(cancel).await }
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!task.is_finished());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(*transport.shut_down.lock().unwrap());
    }

    #[test]
    fn from_config_validates_transport() {
        let mut config = MarqueeConfig::default();
        config.transport.kind = TransportKind::Serial;
        let err = Daemon::from_config(&config).unwrap_err();
        assert!(matches!(err, MarqueeError::Config(_)));
    }
}
