//! Host-side panel runtime.
//!
//! Runs the display sequencer against an in-memory frame buffer. Text
//! arrives over `POST /post` (network channel) and on stdin (serial
//! channel); each completed reveal is logged as the rows on screen.

use clap::Parser;
use marquee::MarqueeConfig;
use marquee::device::http::InboundServer;
use marquee::device::{self, DeviceContext, FrameBuffer, InboundChannel, InboundChunk, SequencerState};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Loop period of the panel runtime.
const TICK: Duration = Duration::from_millis(5);

/// Marquee panel: display sequencer with HTTP and stdin ingestion.
#[derive(Parser)]
#[command(name = "marquee-panel", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address for the inbound endpoint (overrides `panel.bind_addr`).
    #[arg(short, long)]
    bind: Option<String>,

    /// Do not read the serial channel from stdin.
    #[arg(long)]
    no_stdin: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("marquee=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = MarqueeConfig::load(cli.config.as_deref())?;
    let panel = &config.panel;
    let bind = cli.bind.unwrap_or_else(|| panel.bind_addr.clone());

    let (tx, rx) = mpsc::channel::<InboundChunk>(64);
    let server = InboundServer::start(&bind, tx.clone()).await?;

    if !cli.no_stdin {
        tokio::spawn(read_stdin(tx));
    } else {
        drop(tx);
    }

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            cancel_clone.cancel();
        }
    });

    let ctx = DeviceContext::new(
        FrameBuffer::new(panel.width, panel.height),
        StdRng::from_entropy(),
        panel.timing(),
        Instant::now(),
    );
    info!(
        width = panel.width,
        height = panel.height,
        canned = %ctx.catalog().current(),
        "panel started"
    );

    device::run(ctx, rx, TICK, cancel, |state, fb: &FrameBuffer| {
        if state == SequencerState::Done {
            info!(rows = ?fb.text_rows(), "reveal complete");
        }
    })
    .await;

    server.shutdown();
    info!("marquee-panel shut down cleanly");
    Ok(())
}

/// Forwards stdin bytes to the serial channel until EOF.
async fn read_stdin(tx: mpsc::Sender<InboundChunk>) {
    let mut stdin = tokio::io::stdin();
    let mut buf = [0u8; 512];
    loop {
        match stdin.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("stdin closed; serial channel idle");
                return;
            }
            Ok(n) => {
                let chunk = InboundChunk::new(InboundChannel::Serial, &buf[..n]);
                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                return;
            }
        }
    }
}
