//! Serial transport: raw bytes over a lazily opened, reused port.

use super::{DeliveryReceipt, Transport, to_ascii_lossy};
use crate::config::TransportKind;
use crate::error::{MarqueeError, Result};
use crate::format::FormattedPayload;
use async_trait::async_trait;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Settle time after opening, before the first write.
const OPEN_SETTLE: Duration = Duration::from_millis(200);

type PortHandle = Box<dyn Write + Send>;
type PortOpener = dyn Fn(&str, u32, Duration) -> Result<PortHandle> + Send + Sync;

/// Opens a hardware port with DTR and RTS held low so ESP32-style boards do
/// not reset on open.
fn open_hardware_port(name: &str, baud: u32, timeout: Duration) -> Result<PortHandle> {
    let mut port = serialport::new(name, baud).timeout(timeout).open()?;
    if let Err(e) = port.write_data_terminal_ready(false) {
        tracing::debug!(error = %e, "could not clear DTR");
    }
    if let Err(e) = port.write_request_to_send(false) {
        tracing::debug!(error = %e, "could not clear RTS");
    }
    std::thread::sleep(OPEN_SETTLE);
    Ok(Box::new(port))
}

/// Writes the ASCII-coerced payload to a serial port.
///
/// The port is opened on first use and kept open across cycles. A failed
/// write drops the handle so the next delivery reopens it.
pub struct SerialTransport {
    port_name: String,
    baud: u32,
    timeout: Duration,
    handle: Arc<Mutex<Option<PortHandle>>>,
    opener: Arc<PortOpener>,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port_name", &self.port_name)
            .field("baud", &self.baud)
            .finish()
    }
}

impl SerialTransport {
    pub fn new(port_name: impl Into<String>, baud: u32, timeout_ms: u64) -> Self {
        Self::with_opener(port_name, baud, timeout_ms, open_hardware_port)
    }

    /// Uses `opener` instead of the hardware port.
    pub fn with_opener<F>(port_name: impl Into<String>, baud: u32, timeout_ms: u64, opener: F) -> Self
    where
        F: Fn(&str, u32, Duration) -> Result<PortHandle> + Send + Sync + 'static,
    {
        Self {
            port_name: port_name.into(),
            baud,
            timeout: Duration::from_millis(timeout_ms),
            handle: Arc::new(Mutex::new(None)),
            opener: Arc::new(opener),
        }
    }

    /// Returns `true` if a handle is currently held.
    pub fn is_open(&self) -> bool {
        self.handle.lock().map(|h| h.is_some()).unwrap_or(false)
    }

    /// Opens the port if needed and writes `bytes` on a blocking thread.
    async fn write_bytes(&self, bytes: Vec<u8>) -> Result<usize> {
        let handle = Arc::clone(&self.handle);
        let opener = Arc::clone(&self.opener);
        let port_name = self.port_name.clone();
        let baud = self.baud;
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            let mut guard = handle
                .lock()
                .map_err(|_| MarqueeError::Serial("serial handle lock poisoned".to_owned()))?;

            let port = match guard.take() {
                Some(port) => port,
                None => {
                    let port = opener(&port_name, baud, timeout)?;
                    tracing::info!(port = %port_name, baud, "serial port opened");
                    port
                }
            };
            let port = guard.insert(port);

            if bytes.is_empty() {
                return Ok(0);
            }
            if let Err(e) = port.write_all(&bytes).and_then(|()| port.flush()) {
                *guard = None;
                return Err(MarqueeError::Serial(format!(
                    "write to {port_name} failed: {e}"
                )));
            }
            Ok(bytes.len())
        })
        .await
        .map_err(|e| MarqueeError::Serial(format!("serial task failed: {e}")))?
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    async fn prepare(&self) -> Result<()> {
        self.write_bytes(Vec::new()).await.map(|_| ())
    }

    async fn deliver(&self, payload: &FormattedPayload) -> Result<DeliveryReceipt> {
        let bytes = to_ascii_lossy(&payload.to_wire()).into_bytes();
        let written = self.write_bytes(bytes).await?;
        tracing::debug!(port = %self.port_name, bytes = written, "serial write");
        Ok(DeliveryReceipt {
            transport: TransportKind::Serial,
            bytes: written,
        })
    }

    async fn shutdown(&self) {
        if let Ok(mut guard) = self.handle.lock() {
            if guard.take().is_some() {
                tracing::info!(port = %self.port_name, "serial port closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::format::format_response;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Writer appending into shared memory.
    #[derive(Clone, Default)]
    struct SharedSink {
        data: Arc<Mutex<Vec<u8>>>,
        fail: Arc<Mutex<bool>>,
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if *self.fail.lock().unwrap() {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"));
            }
            self.data.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn transport_with(sink: SharedSink, opens: Arc<AtomicUsize>) -> SerialTransport {
        SerialTransport::with_opener("/dev/fake", 115_200, 100, move |_, _, _| {
            opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(sink.clone()) as PortHandle)
        })
    }

    #[tokio::test]
    async fn opens_lazily_and_reuses_handle() {
        let sink = SharedSink::default();
        let opens = Arc::new(AtomicUsize::new(0));
        let transport = transport_with(sink.clone(), Arc::clone(&opens));
        assert!(!transport.is_open());
        assert_eq!(opens.load(Ordering::SeqCst), 0);

        let payload = format_response("Moths circle the porch light.", 28, 6, 19);
        transport.deliver(&payload).await.unwrap();
        transport.deliver(&payload).await.unwrap();

        assert!(transport.is_open());
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        let written = sink.data.lock().unwrap().clone();
        let expected = "Moths circle the porch light.\n".repeat(2);
        assert_eq!(String::from_utf8(written).unwrap(), expected);
    }

    #[tokio::test]
    async fn prepare_opens_without_writing() {
        let sink = SharedSink::default();
        let opens = Arc::new(AtomicUsize::new(0));
        let transport = transport_with(sink.clone(), Arc::clone(&opens));
        transport.prepare().await.unwrap();
        assert!(transport.is_open());
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert!(sink.data.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_write_drops_handle_and_reopens() {
        let sink = SharedSink::default();
        let opens = Arc::new(AtomicUsize::new(0));
        let transport = transport_with(sink.clone(), Arc::clone(&opens));
        let payload = format_response("Hi.", 28, 6, 19);

        *sink.fail.lock().unwrap() = true;
        let err = transport.deliver(&payload).await.unwrap_err();
        assert!(matches!(err, MarqueeError::Serial(_)));
        assert!(!transport.is_open());

        *sink.fail.lock().unwrap() = false;
        transport.deliver(&payload).await.unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn open_failure_is_reported() {
        let transport = SerialTransport::with_opener("/dev/missing", 9600, 100, |name, _, _| {
            Err(MarqueeError::Serial(format!("{name}: no such device")))
        });
        let payload = format_response("Hi.", 28, 6, 19);
        let err = transport.deliver(&payload).await.unwrap_err();
        assert!(err.to_string().contains("/dev/missing"));
    }

    #[tokio::test]
    async fn shutdown_closes_handle() {
        let transport = transport_with(SharedSink::default(), Arc::new(AtomicUsize::new(0)));
        transport.prepare().await.unwrap();
        transport.shutdown().await;
        assert!(!transport.is_open());
    }
}
