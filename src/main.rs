//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `proxy_harvest` library that handles:
//! - Command-line argument parsing
//! - Environment variable loading (.env file)
//! - Logger initialization
//! - JSON output of query results
//!
//! All core functionality is implemented in the library crate.

mod cli;

use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tokio_util::sync::CancellationToken;

use proxy_harvest::initialization::init_logger_with;
use proxy_harvest::storage::{
    dashboard_stats, enqueue_repo, init_db_pool_with_path, parse_repo_id, pending_repos,
    query_cycle_history, queue_stats, run_migrations, top_by_score,
};
use proxy_harvest::{build_pipeline, run_daemon};

use cli::{Command, Opt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists).
    // Try the current directory first, then the executable's directory.
    if dotenvy::dotenv().is_err() {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let env_path = exe_dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                }
            }
        }
    }

    let opt = Opt::parse();

    let log_level = opt.log_level.clone();
    let log_format = opt.log_format.clone();
    init_logger_with(log_level.into(), log_format).context("Failed to initialize logger")?;

    if let Err(e) = run(opt).await {
        eprintln!("proxy_harvest error: {:#}", e);
        process::exit(1);
    }
    Ok(())
}

async fn run(opt: Opt) -> Result<()> {
    let base = opt.base_config();
    let db_path = base.db_path.clone();

    match opt.command {
        Command::RunOnce(harvest) => {
            let config = harvest.into_config(base, 0);
            let pipeline = build_pipeline(&config).await?;
            let stats = pipeline.run_cycle().await;
            print_json(&stats)?;
            if stats.persist_failed {
                return Err(anyhow!("cycle results could not be saved to {}", config.db_path.display()));
            }
        }
        Command::Daemon {
            harvest,
            interval_minutes,
        } => {
            let config = harvest.into_config(base, interval_minutes);
            let pipeline = build_pipeline(&config).await?;

            let cancel = CancellationToken::new();
            let signal_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("Ctrl-C received, stopping after the current cycle");
                }
                signal_cancel.cancel();
            });

            let interval = Duration::from_secs(config.daemon_interval_minutes.saturating_mul(60));
            let cycles = run_daemon(&pipeline, interval, cancel).await;
            println!("Completed {cycles} cycle{}", if cycles == 1 { "" } else { "s" });
        }
        Command::Enqueue { repo, note, force } => {
            let repo_id = parse_repo_id(&repo).ok_or_else(|| anyhow!("not a GitHub repository: {repo}"))?;
            let pool = open_store(&db_path).await?;
            let result = enqueue_repo(&pool, &repo_id, note.as_deref(), force, base.rescan_threshold())
                .await
            .context("Failed to enqueue repository")?;
            print_json(&serde_json::json!({ "repo": repo_id, "result": result }))?;
        }
        Command::Top { limit, countries } => {
            let pool = open_store(&db_path).await?;
            let records = top_by_score(&pool, limit, &countries)
                .await
                .context("Failed to query proxies")?;
            print_json(&records)?;
        }
        Command::Queue { limit } => {
            let pool = open_store(&db_path).await?;
            let counts = queue_stats(&pool).await.context("Failed to read queue")?;
            let pending = pending_repos(&pool, limit).await.context("Failed to read queue")?;
            print_json(&serde_json::json!({ "counts": counts, "pending": pending }))?;
        }
        Command::Stats => {
            let pool = open_store(&db_path).await?;
            let stats = dashboard_stats(&pool, chrono::Utc::now().timestamp_millis())
                .await
                .context("Failed to compute statistics")?;
            print_json(&stats)?;
        }
        Command::History { limit } => {
            let pool = open_store(&db_path).await?;
            let runs = query_cycle_history(&pool, Some(limit))
                .await
                .context("Failed to read cycle history")?;
            print_json(&runs)?;
        }
    }
    Ok(())
}

/// Opens the database for the query commands, creating the schema if needed.
async fn open_store(db_path: &Path) -> Result<Arc<Pool<Sqlite>>> {
    let pool = init_db_pool_with_path(db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    run_migrations(&pool).await.context("Failed to apply migrations")?;
    Ok(pool)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}
