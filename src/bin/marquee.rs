//! Marquee background process: generate, format and deliver on an interval.

use clap::{Parser, Subcommand};
use marquee::{Daemon, MarqueeConfig};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Marquee: model-written one-liners for an LED panel.
#[derive(Parser)]
#[command(name = "marquee", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Run the generation loop until interrupted.
    Run,

    /// Run a single cycle and exit; the exit status reflects the outcome.
    Once,

    /// Format text the way a cycle would and print the payload.
    Preview {
        /// Raw text to format.
        text: String,
    },

    /// Write the effective configuration (file, defaults and environment) to
    /// the config path.
    Init {
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("marquee=info")),
        )
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run);
    if let Command::Init { force } = command {
        return init(cli.config, force);
    }
    let config = MarqueeConfig::load(cli.config.as_deref())?;

    match command {
        Command::Run => run_loop(&config).await,
        Command::Once => run_once(&config).await,
        Command::Preview { text } => preview(&config, &text),
        Command::Init { .. } => Ok(()),
    }
}

async fn run_loop(config: &MarqueeConfig) -> anyhow::Result<()> {
    let daemon = Daemon::from_config(config)?;
    daemon.prepare().await;

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            cancel_clone.cancel();
        }
    });

    daemon.run(cancel).await;
    Ok(())
}

async fn run_once(config: &MarqueeConfig) -> anyhow::Result<()> {
    let daemon = Daemon::from_config(config)?;
    let result = daemon.run_cycle().await;
    daemon.shutdown().await;

    let report = result?;
    println!("{}", report.payload);
    println!("{}", report.receipt);
    Ok(())
}

fn preview(config: &MarqueeConfig, text: &str) -> anyhow::Result<()> {
    let payload = marquee::format_response(
        text,
        config.display.max_tokens,
        config.display.max_lines,
        config.display.effective_width(),
    );
    if payload.is_empty() {
        anyhow::bail!("nothing to show: the text has no words");
    }
    println!("{payload}");
    Ok(())
}

fn init(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(MarqueeConfig::default_config_path);
    let config = if path.exists() {
        if !force {
            anyhow::bail!("{} already exists; pass --force to replace it", path.display());
        }
        MarqueeConfig::load(Some(&path))?
    } else {
        MarqueeConfig::load(None)?
    };
    config.save_to_file(&path)?;
    info!(path = %path.display(), "configuration written");
    println!("{}", path.display());
    Ok(())
}
