//! lbgridd — the lbgrid daemon.
//!
//! Single binary that assembles the scheduler subsystems:
//! - Device store (redb)
//! - Driver registry
//! - Balancer scheduler
//! - Confirmation listener
//! - REST API
//!
//! # Usage
//!
//! ```text
//! lbgridd serve --port 9696 --data-dir /var/lib/lbgrid
//! lbgridd config > lbgrid.toml
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use lbgrid_core::SchedulerConfig;
use lbgrid_scheduler::{BalancerScheduler, ConfirmationListener, ControlChannel, DriverRegistry, ExternalDriver};
use lbgrid_state::DeviceStore;

/// Capacity of the confirmation channel between drivers and the listener.
const CONFIRMATION_BUFFER: usize = 256;

#[derive(Parser)]
#[command(name = "lbgridd", about = "lbgrid load balancer scheduler daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and serve the REST API.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "9696")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/lbgrid")]
        data_dir: PathBuf,

        /// TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Maximum resources per device; overrides the config file.
        #[arg(long)]
        resource_limit: Option<u32>,
    },

    /// Print the default configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,lbgridd=debug,lbgrid=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            data_dir,
            config,
            resource_limit,
        } => {
            let config = load_config(config.as_deref(), resource_limit)?;
            run_serve(port, data_dir, config).await
        }
        Command::Config => {
            print!("{}", SchedulerConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>, resource_limit: Option<u32>) -> anyhow::Result<SchedulerConfig> {
    let mut config = match path {
        Some(path) => {
            info!(path = ?path, "loading configuration");
            SchedulerConfig::from_file(path)?
        }
        None => SchedulerConfig::default(),
    };
    if let Some(limit) = resource_limit {
        config.placement.resource_limit = limit;
    }
    config.validate()?;
    Ok(config)
}

async fn run_serve(port: u16, data_dir: PathBuf, config: SchedulerConfig) -> anyhow::Result<()> {
    info!("lbgrid daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let db_path = match &config.store.path {
        Some(path) => path.clone(),
        None => {
            std::fs::create_dir_all(&data_dir)?;
            data_dir.join("lbgrid.redb")
        }
    };
    let store = DeviceStore::open(&db_path)?;
    info!(path = ?db_path, "device store opened");

    let mut registry = DriverRegistry::new();
    registry.register(Arc::new(ExternalDriver::new(config.backend.identity())))?;
    let registry = Arc::new(registry);
    let drivers: Vec<String> = registry.identities().iter().map(ToString::to_string).collect();
    info!(?drivers, "device drivers loaded");

    let scheduler = Arc::new(BalancerScheduler::new(store, &config, &registry)?);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let (confirm_tx, confirm_rx) = mpsc::channel(CONFIRMATION_BUFFER);
    let listener = ConfirmationListener::new(scheduler.clone());
    let listener_handle = tokio::spawn(listener.run(confirm_rx, shutdown_rx));

    // ── Start API server ───────────────────────────────────────

    let router = lbgrid_api::build_router(lbgrid_api::ApiState {
        scheduler,
        control: ControlChannel::new(registry, confirm_tx),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let tcp = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(tcp, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    match listener_handle.await {
        Ok(applied) => info!(applied, "confirmation listener stopped"),
        Err(e) => error!(error = %e, "confirmation listener panicked"),
    }

    info!("lbgrid daemon stopped");
    Ok(())
}
