use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use svcpulse::api::{self, AppState};
use svcpulse::config::ConfigStore;
use svcpulse::engine::Dispatcher;
use svcpulse::probes::Prober;
use svcpulse::resolver::DnsResolver;

#[derive(Parser)]
#[command(name = "svcpulse", version, about = "Service status dashboard")]
struct Cli {
    /// Service configuration (YAML, or JSON with a .json extension)
    #[arg(short = 'c', long, env = "CONFIG_PATH", default_value = "config.yaml")]
    config: PathBuf,

    /// Address the dashboard listens on
    #[arg(short = 'l', long, env = "LISTEN_ADDR", default_value = "0.0.0.0:5000")]
    listen: SocketAddr,

    /// Path the dashboard is mounted under
    #[arg(short = 'b', long, env = "BASE_PATH", default_value = "/")]
    base_path: String,

    /// Probe the public services once, print JSON and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let store = ConfigStore::open(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    let config = store.snapshot().await;
    info!(
        path = %store.path().display(),
        services = config.services.len(),
        admin = config.admin.is_some(),
        "Loaded config"
    );

    let resolver = DnsResolver::new(config.dns)?;
    let prober = Prober::new(resolver, config.timeouts.clone())?;
    let dispatcher = Arc::new(Dispatcher::new(prober, config.max_concurrency));

    if cli.once {
        let records = dispatcher.dispatch(&config.services).await;
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let state = AppState::new(Arc::new(store), dispatcher, &cli.base_path);
    api::start_server(cli.listen, state).await?;

    info!("Shutdown complete");
    Ok(())
}
