mod config;
mod input;
mod render;
mod simulated;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use kiosk_core::{Collaborators, HttpBackend, Orchestrator, OrchestratorConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{config::load_settings, simulated::SimulatedBackend};

#[derive(Parser, Debug)]
#[command(about = "Photo booth kiosk session runner")]
struct Args {
    /// Backend base URL. Overrides the config file and environment.
    #[arg(long)]
    server_url: Option<String>,
    /// Path to a kiosk.toml settings file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Run against an in-process simulated backend.
    #[arg(long)]
    simulate: bool,
    /// Waiting polls the simulated camera reports before capturing.
    #[arg(long, default_value_t = 3)]
    simulate_polls: u32,
    /// Seed for the decorative spin reel.
    #[arg(long)]
    spin_seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    settings.validate()?;

    let clients = if args.simulate {
        info!(waiting_polls = args.simulate_polls, "using simulated backend");
        Collaborators::from_backend(Arc::new(SimulatedBackend::new(args.simulate_polls)))
    } else {
        let backend = HttpBackend::new(&settings.server_url, settings.request_timeout())?;
        match backend.health().await {
            Ok(health) => info!(server_url = %backend.base_url(), status = %health.status, "backend reachable"),
            Err(error) => warn!(server_url = %backend.base_url(), %error, "backend health check failed; continuing"),
        }
        Collaborators::from_backend(Arc::new(backend))
    };

    let config = OrchestratorConfig {
        timings: settings.timings(),
        poll_policy: settings.poll_policy(),
        spin_pool: settings.spin_pool.clone(),
        spin_seed: args.spin_seed,
        ..OrchestratorConfig::default()
    };
    let (handle, orchestrator) = Orchestrator::spawn(clients, config);
    let renderer = tokio::spawn(render::run(handle.watch(), handle.subscribe_events()));

    println!("{}", input::HELP);
    input::run(handle.clone(), tokio::io::stdin()).await?;

    handle.shutdown().await?;
    orchestrator.await?;
    renderer.abort();
    Ok(())
}
