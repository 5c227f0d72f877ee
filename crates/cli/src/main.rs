//! `hookflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the API server.
//! - `worker`   — start the queue worker pools.
//! - `migrate`  — run pending database migrations.
//! - `validate` — validate a workflow definition JSON file.
//! - `gc`       — delete expired idempotency keys.

mod config;
mod validate;
mod worker;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use config::AppConfig;

#[derive(Parser)]
#[command(name = "hookflow", about = "Webhook-triggered workflow automation engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve,
    /// Start the queue worker pools (`execute` + `ai`).
    Worker,
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate a workflow definition JSON file without loading it.
    Validate {
        /// Path to the workflow JSON file.
        path: std::path::PathBuf,
    },
    /// Delete expired idempotency keys (spec.md §6).
    Gc,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve => {
            let cfg = AppConfig::from_env();
            info!(bind = %cfg.bind_addr(), "starting API server");

            let pool = db::pool::create_pool(&cfg.database_url, 10).await?;
            let queue = queue::Queue::connect(&cfg.redis_url).await?;

            api::serve(&cfg.bind_addr(), pool, queue, cfg.api_key).await?;
        }
        Command::Worker => {
            let cfg = AppConfig::from_env();
            info!("starting queue worker pools");

            let pool = db::pool::create_pool(&cfg.database_url, 20).await?;
            let queue = queue::Queue::connect(&cfg.redis_url).await?;
            let locks = queue::LockManager::connect(&cfg.redis_url).await?;
            let registry = nodes::default_registry(cfg.lm_studio_url.clone());

            let processor = Arc::new(engine::RunProcessor::new(pool, queue.clone(), locks, registry, cfg.processor_config()));

            worker::run_worker_pools(queue, processor).await;
        }
        Command::Migrate { database_url } => {
            info!("running migrations against {database_url}");
            let pool = db::pool::create_pool(&database_url, 2).await?;
            db::pool::run_migrations(&pool).await?;
            info!("migrations applied successfully");
        }
        Command::Validate { path } => {
            let content = std::fs::read_to_string(&path)?;
            let definition: validate::WorkflowDefinition = serde_json::from_str(&content)?;

            match validate::validate(&definition) {
                Ok(()) => println!("workflow definition is valid"),
                Err(e) => {
                    eprintln!("validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Gc => {
            let cfg = AppConfig::from_env();
            let pool = db::pool::create_pool(&cfg.database_url, 2).await?;
            let deleted = db::repository::idempotency::delete_expired(&pool).await?;
            info!(deleted, "expired idempotency keys removed");
        }
    }

    Ok(())
}
