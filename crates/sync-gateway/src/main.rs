//! Sync Gateway CLI
//!
//! Supports two modes:
//! - serve: host the write gateway over an in-memory store behind the admin API
//! - evaluate: run the sync policy once against documents on disk

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sync_gateway::{run_admin_server, AdminState, MemoryStore, WriteGateway};
use sync_policy_core::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sync-gateway")]
#[command(about = "Write-path gateway enforcing the expense reporting sync policy")]
#[command(version)]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true, env = "SYNC_POLICY_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides observability.log_level
    #[arg(long, global = true, env = "LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the admin API over an in-memory gateway
    Serve {
        /// Overrides admin.listen
        #[arg(long, env = "ADMIN_LISTEN")]
        listen: Option<String>,
    },

    /// Evaluate one proposed revision and print the decision
    Evaluate {
        /// Proposed document (JSON)
        #[arg(long = "new")]
        proposed: PathBuf,

        /// Currently stored revision (JSON)
        #[arg(long)]
        previous: Option<PathBuf>,

        /// Treat the write as a deletion
        #[arg(long)]
        delete: bool,
    },
}

fn init_tracing(config: &GatewayConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    if config.observability.log_format == "pretty" {
        tracing_subscriber::registry()
            .with(fmt::layer().pretty())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    }
}

fn read_document(path: &Path) -> anyhow::Result<Document> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not a JSON object", path.display()))
}

async fn serve(config: GatewayConfig) -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(WriteGateway::new(store, &config));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        policy = gateway.policy_name(),
        emptiness = ?config.policy.emptiness,
        tombstone_routing = ?config.policy.tombstone_routing,
        "Starting sync-gateway"
    );

    if config.admin.enabled {
        run_admin_server(&config.admin.listen, AdminState::new(gateway)).await?;
    } else {
        warn!("Admin API disabled, nothing accepts writes; waiting for shutdown");
        tokio::signal::ctrl_c().await?;
    }

    info!("sync-gateway stopped");
    Ok(())
}

fn evaluate(
    config: &GatewayConfig,
    proposed: &Path,
    previous: Option<&Path>,
    delete: bool,
) -> anyhow::Result<bool> {
    let proposed = read_document(proposed)?;
    let previous = previous.map(read_document).transpose()?;

    let policy = ExpensePolicy::from_config(&config.policy);
    let decision = policy.evaluate(&proposed, previous.as_ref(), delete);

    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(decision.is_accepted())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = args.config.as_ref().map(|p| p.to_string_lossy().into_owned());
    let mut config = GatewayConfig::load(config_path.as_deref()).context("invalid configuration")?;
    if let Some(level) = args.log_level {
        config.observability.log_level = level;
    }

    match args.command {
        Command::Serve { listen } => {
            if let Some(listen) = listen {
                config.admin.listen = listen;
            }
            init_tracing(&config);
            serve(config).await
        }
        Command::Evaluate {
            proposed,
            previous,
            delete,
        } => {
            // stdout carries the decision; keep logs off it
            if !evaluate(&config, &proposed, previous.as_deref(), delete)? {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
