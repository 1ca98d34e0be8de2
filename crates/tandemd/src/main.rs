//! tandemd — the Tandem pair supervisor daemon.
//!
//! Single binary that assembles the supervisor stack:
//! - Order table (redb)
//! - Connection cache over the node client
//! - Provisioner (lease allocation + pair bring-up)
//! - Health monitor loop (probe, failover, coordination, reaping)
//!
//! The `sim` mode runs all of it against the in-process fake cluster,
//! which is enough to watch pairs being healed end to end.
//!
//! # Usage
//!
//! ```text
//! tandemd sim --data-dir /var/lib/tandem --orders 2
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use tandem_core::TandemConfig;
use tandem_healer::{HealthMonitor, Provisioner};
use tandem_node::{ConnectOptions, ConnectionCache, NodeConnector};
use tandem_orch::ContainerOrchestrator;
use tandem_sim::SimCluster;
use tandem_state::{HostInfo, OrderStore};

#[derive(Parser)]
#[command(name = "tandemd", about = "Tandem pair supervisor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Supervise pairs on the in-process sim cluster.
    Sim {
        /// Config file; defaults apply when it does not exist.
        #[arg(long, default_value = "tandem.toml")]
        config: PathBuf,

        /// Data directory for the order table.
        #[arg(long, default_value = "/var/lib/tandem")]
        data_dir: PathBuf,

        /// Demo orders to seed at startup.
        #[arg(long, default_value = "2")]
        orders: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tandemd=debug,tandem_healer=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Sim {
            config,
            data_dir,
            orders,
        } => run_sim(config, data_dir, orders).await,
    }
}

async fn run_sim(config_path: PathBuf, data_dir: PathBuf, orders: u32) -> anyhow::Result<()> {
    info!("tandem supervisor starting against the sim cluster");

    let config = if config_path.exists() {
        let loaded = TandemConfig::from_file(&config_path)?;
        info!(path = ?config_path, "config loaded");
        loaded
    } else {
        info!(path = ?config_path, "no config file, using defaults");
        TandemConfig::default()
    };

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("tandem.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = OrderStore::open(&db_path)?;
    info!(path = ?db_path, "order table opened");

    store.put_host(&HostInfo {
        id: config.instance.host_id.clone(),
        address: "127.0.0.1".to_string(),
        labels: Default::default(),
    })?;

    let sim = SimCluster::new(&config.network.subnet, &config.network.gateway);
    let orchestrator: Arc<dyn ContainerOrchestrator> = Arc::new(sim.clone());
    let connector: Arc<dyn NodeConnector> = Arc::new(sim.clone());
    info!(subnet = %config.network.subnet, "sim cluster ready");

    let provisioner = Provisioner::new(store.clone(), orchestrator.clone(), &config);
    let cache = ConnectionCache::new(
        connector,
        ConnectOptions {
            control_port: config.network.control_port,
            reconnect_interval: config.monitor.reconnect_interval(),
        },
    );
    let mut monitor = HealthMonitor::new(
        store.clone(),
        cache,
        orchestrator,
        provisioner.pending(),
        config,
    );

    // A previous run may have died mid-pass.
    let reset = monitor.reset_stale_orders()?;
    if reset > 0 {
        info!(reset, "stale orders returned to ready");
    }

    // ── Demo orders ────────────────────────────────────────────

    // The sim cluster starts empty on every boot, so orders carried over
    // in the table would point at containers that no longer exist; the
    // first passes heal them. Fresh seeds fill up to the requested count.
    let existing = store.select_all()?.len() as u32;
    for n in existing..orders {
        let owner = format!("demo-{}", n + 1);
        let pair_name = format!("cache-{}", n + 1);
        let memsize = if n % 2 == 0 { None } else { Some(1.2) };
        let order = provisioner.create_order(&owner, &pair_name, memsize).await?;
        info!(order_id = order.id, pair = %order.pair_name, "demo order seeded");
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_shutdown = shutdown_rx.clone();

    // ── Monitor loop ───────────────────────────────────────────

    let monitor_handle = tokio::spawn(async move {
        monitor.run(monitor_shutdown).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = monitor_handle.await;

    info!("tandem supervisor stopped");
    Ok(())
}
