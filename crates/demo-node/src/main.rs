//! Reference serverset node.
//!
//! Runs entirely against the in-process coordination store: one session
//! registers a batch of endpoints, a second session watches the directory,
//! and every membership change is logged.  Then the endpoints are closed
//! one by one, oldest first.
//!
//! Usage:
//!   ss-demo-node --role www-data --service frontend --members 3
//!   ss-demo-node --config serverset.toml
//!
//! Set `RUST_LOG=debug` to see the refresh cycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ss_coordination::MemoryStore;
use ss_domain::ServerSetConfig;
use ss_serversets::{ServerSet, Watch, WatchEvent};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ss-demo-node", about = "Register and watch a serverset")]
struct Cli {
    /// TOML serverset config; flags below override its identity.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    environment: Option<String>,
    #[arg(long)]
    role: Option<String>,
    #[arg(long)]
    service: Option<String>,
    /// Host advertised by every endpoint.
    #[arg(long, default_value = "localhost")]
    host: String,
    #[arg(long, default_value_t = 8000)]
    base_port: u16,
    /// Number of endpoints to register.
    #[arg(long, default_value_t = 3)]
    members: u16,
}

fn load_config(cli: &Cli) -> anyhow::Result<ServerSetConfig> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ServerSetConfig::new("test", "demo", "demo-node"),
    };
    if let Some(environment) = &cli.environment {
        config.environment = environment.clone();
    }
    if let Some(role) = &cli.role {
        config.role = role.clone();
    }
    if let Some(service) = &cli.service {
        config.service = service.clone();
    }
    config.validate()?;
    Ok(config)
}

fn read_config(path: &Path) -> anyhow::Result<ServerSetConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(ServerSetConfig::from_toml_str(&raw)?)
}

async fn log_next(watch: &mut Watch) -> anyhow::Result<()> {
    match watch.event().await {
        Some(WatchEvent::Changed) => {
            tracing::info!(
                event_count = watch.event_count(),
                members = ?watch.endpoints(),
                "membership changed"
            );
            Ok(())
        }
        Some(WatchEvent::Error(e)) => Err(e.into()),
        None => anyhow::bail!("watch ended"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let store = MemoryStore::new();
    let registrar = ServerSet::from_config(&config, Arc::new(store.connect(&config.servers)))?;
    let observer = ServerSet::from_config(&config, Arc::new(store.connect(&config.servers)))?;

    let mut watch = observer.watch().await?;
    tracing::info!(directory = %watch.directory(), "watching");

    let mut endpoints = Vec::with_capacity(cli.members as usize);
    for i in 0..cli.members {
        let port = cli.base_port.saturating_add(i);
        endpoints.push(registrar.register_endpoint(&cli.host, port, None).await?);
        log_next(&mut watch).await?;
    }

    for mut endpoint in endpoints {
        endpoint.close().await?;
        log_next(&mut watch).await?;
    }

    tracing::info!(event_count = watch.event_count(), "done");
    watch.close();
    Ok(())
}
