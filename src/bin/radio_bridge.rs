//! Radio bridge helper: owns the BLE connection for the marquee process.
//!
//! Reads one JSON command per line from stdin and answers one JSON response
//! per line on stdout. All tracing output goes to stderr so stdout stays a
//! clean protocol channel.

use marquee::bridge::BridgeResponse;
use tokio::io::{AsyncWriteExt, BufReader, Stdin, Stdout};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("marquee=info")),
        )
        .init();

    tracing::info!("marquee-radio-bridge starting");
    run_bridge(BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
    tracing::info!("marquee-radio-bridge shut down cleanly");
    Ok(())
}

#[cfg(feature = "ble")]
async fn run_bridge(stdin: BufReader<Stdin>, stdout: Stdout) -> anyhow::Result<()> {
    let link = match marquee::bridge::ble::BleLink::new().await {
        Ok(link) => link,
        Err(e) => return report_unavailable(stdout, format!("radio stack unavailable: {e}")).await,
    };
    let mut server = marquee::bridge::BridgeServer::new(link);
    server.serve(stdin, stdout).await.map_err(|e| {
        tracing::error!(error = %e, "radio bridge exited with error");
        anyhow::anyhow!("radio bridge failed: {e}")
    })
}

#[cfg(not(feature = "ble"))]
async fn run_bridge(_stdin: BufReader<Stdin>, stdout: Stdout) -> anyhow::Result<()> {
    report_unavailable(
        stdout,
        "radio stack unavailable (built without the `ble` feature)".to_owned(),
    )
    .await
}

/// Emits the start-up error before any command arrives, so the caller
/// surfaces it as the first connection failure, then exits.
async fn report_unavailable(mut stdout: Stdout, message: String) -> anyhow::Result<()> {
    tracing::error!(error = %message, "cannot serve radio commands");
    let line = BridgeResponse::error(message).to_line()?;
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await?;
    std::process::exit(1);
}
