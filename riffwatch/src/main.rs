//! riffwatch - Rocksmith telemetry overlay backend
//!
//! Polls the local telemetry source, reconciles it into a read model and
//! serves that model to the overlay over HTTP.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Tip store: $XDG_DATA_HOME/riffwatch/song_tips.json (~/.local/share/riffwatch/song_tips.json)
//! - Logs: $XDG_STATE_HOME/riffwatch/riffwatch.log (~/.local/state/riffwatch/riffwatch.log)
//! - Config: $XDG_CONFIG_HOME/riffwatch/config.toml (~/.config/riffwatch/config.toml)

mod server;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use riffwatch_core::config::TransportMode;
use riffwatch_core::{tips, Config, Engine};

#[derive(Parser)]
#[command(name = "riffwatch")]
#[command(about = "Serve reconciled Rocksmith telemetry to an overlay")]
#[command(version)]
struct Args {
    /// Config file (defaults to $XDG_CONFIG_HOME/riffwatch/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Telemetry transport: http or socket
    #[arg(long)]
    mode: Option<TransportMode>,

    /// Port of the local telemetry source
    #[arg(long)]
    telemetry_port: Option<u16>,

    /// Port the query API listens on
    #[arg(short, long)]
    port: Option<u16>,

    /// Polling interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    /// Command-line flags override the config file.
    fn apply(&self, config: &mut Config) {
        if let Some(mode) = self.mode {
            config.telemetry.mode = mode;
        }
        if let Some(port) = self.telemetry_port {
            config.telemetry.port = port;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.polling.interval_ms = interval_ms;
        }
        match self.verbose {
            0 => {}
            1 => config.logging.level = "debug".to_string(),
            _ => config.logging.level = "trace".to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    // Initialize logging
    let _log_guard =
        riffwatch_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("riffwatch starting up");

    // Claim the query port before anything else starts
    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("query port {addr} is already in use or unavailable"))?;

    let generator = tips::create_generator(config.llm.as_ref(), config.tips.tips_per_kind)
        .context("failed to configure tip generator")?;
    let engine = Engine::start(&config, generator).context("failed to start telemetry engine")?;

    let shutdown = engine.cancellation_token();
    ctrlc::set_handler({
        let shutdown = shutdown.clone();
        move || shutdown.cancel()
    })
    .context("failed to install Ctrl-C handler")?;

    tracing::info!(
        addr = %addr,
        mode = ?config.telemetry.mode,
        telemetry = %config.telemetry.address(),
        "Query API listening"
    );
    println!("riffwatch serving on http://{addr}");

    axum::serve(listener, server::router(engine.clone()))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("query server failed")?;

    engine.shutdown().await;
    tracing::info!("riffwatch shut down");

    Ok(())
}
