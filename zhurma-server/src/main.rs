use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use zhurma_core::config::{BotConfig, TOKEN_VAR, parse_member_id};
use zhurma_core::eventbus::EventBus;

mod context;
use context::ServerContext;

#[derive(Parser, Debug, Clone)]
#[command(name = "zhurma")]
#[command(author, version, about = "Zhurma - Discord airhorn bot")]
struct Args {
    /// Path to the DCA sound asset (overrides ZHURMA_ASSET_PATH)
    #[arg(long)]
    asset: Option<PathBuf>,

    /// Member id whose arrival in a crowded voice channel triggers isolation
    /// (overrides ZHURMA_TRIGGER_MEMBER_ID)
    #[arg(long)]
    trigger_member: Option<String>,

    /// Pause after joining and before leaving voice, in milliseconds
    /// (overrides ZHURMA_SETTLE_DELAY_MS)
    #[arg(long)]
    settle_delay_ms: Option<u64>,
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_log::LogTracer::init().context("Failed to bridge log records")?;
    let filter = EnvFilter::from_default_env()
        .add_directive("zhurma=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub).context("Failed to set global subscriber")?;
    Ok(())
}

fn apply_args(mut config: BotConfig, args: &Args) -> anyhow::Result<BotConfig> {
    if let Some(asset) = &args.asset {
        config.asset_path = asset.clone();
    }
    if let Some(raw) = &args.trigger_member {
        config.trigger_member_id = parse_member_id(raw)?;
    }
    if let Some(ms) = args.settle_delay_ms {
        config.settle_delay = Duration::from_millis(ms);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let config = apply_args(BotConfig::from_env()?, &args)?;
    info!("Zhurma starting. config={:?}", config);

    if !config.has_token() {
        error!("No bot token provided. Set {TOKEN_VAR} in the environment or a .env file.");
        return Ok(());
    }

    let ctx = ServerContext::new(config).await?;
    info!("Zhurma is now running. Press Ctrl-C to exit.");

    let bus = ctx.event_bus.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received; shutting down event bus...");
        bus.shutdown();
    });

    wait_for_bus_shutdown(&ctx.event_bus).await;

    info!("Closing Discord connection...");
    ctx.shutdown().await?;
    info!("Main finished. Goodbye!");
    Ok(())
}

async fn wait_for_bus_shutdown(bus: &EventBus) {
    let mut shutdown_rx = bus.shutdown_rx.clone();
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!("Failed to listen for SIGTERM: {e:?}");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {e:?}");
            }
            return;
        }
    };

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("Failed to listen for Ctrl-C: {e:?}");
            }
        }
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {e:?}");
    }
}
