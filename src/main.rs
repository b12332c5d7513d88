//! membership-sync - Synchronizes a hosted membership platform into a local store
//!
//! This is the main entry point for the membership-sync command line tool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};

use membership_sync::client::{ApiFetcher, MemberSource};
use membership_sync::config::Config;
use membership_sync::database::{LocalStore, SqliteDatabase};
use membership_sync::error::{AppError, SyncError};
use membership_sync::logging::init_tracing;
use membership_sync::models::SyncMode;
use membership_sync::report::{
    assert_no_violations, validate_report, verify_store, ReportWriter, SyncReport,
};
use membership_sync::sync::{cleanup_stale_mappings, detect_stale, run_preflight, SyncOrchestrator};

/// membership-sync - Synchronizes a hosted membership platform into a local store
#[derive(Parser, Debug)]
#[command(name = "membership-sync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "MEMBERSHIP_SYNC_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check API access, schema and status codes without syncing
    Preflight,

    /// Run a sync and write its report
    Sync {
        /// Only fetch records changed since the last run
        #[arg(long)]
        incremental: bool,

        /// Compute everything but write nothing to the store
        #[arg(long)]
        dry_run: bool,
    },

    /// List or remove mappings no sync has confirmed recently
    Stale {
        /// Age in days after which a mapping is stale
        #[arg(long, default_value_t = 90)]
        days: u32,

        /// Delete the stale mapping rows
        #[arg(long)]
        cleanup: bool,

        /// With --cleanup, only report what would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    /// Check a written report against its invariants
    ValidateReport {
        /// Report file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let config = load_config(&args)?;

    // Initialize tracing/logging
    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting membership-sync"
    );

    let result = match args.command {
        Command::Preflight => preflight(&config).await,
        Command::Sync {
            incremental,
            dry_run,
        } => {
            let mode = if incremental {
                SyncMode::Incremental
            } else {
                SyncMode::Full
            };
            tokio::select! {
                result = sync(&config, mode, dry_run) => result,
                _ = shutdown_signal() => {
                    Err(AppError::Internal("Sync interrupted before completion".to_string()))
                }
            }
        }
        Command::Stale {
            days,
            cleanup,
            dry_run,
        } => stale(&config, days, cleanup, dry_run).await,
        Command::ValidateReport { path } => validate(&path).await,
    };

    if let Err(e) = &result {
        error!(error = %e, "membership-sync failed");
    }
    result.map_err(Into::into)
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let config = match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path)
        }
        None => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from environment variables");
            Config::from_env()
        }
    };
    config.map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
}

async fn open_store(config: &Config) -> Result<Arc<SqliteDatabase>, AppError> {
    let database = SqliteDatabase::new(&config.database.path).await?;
    info!(path = %config.database.path, "Database initialized");
    Ok(Arc::new(database))
}

fn open_source(config: &Config) -> Result<Arc<ApiFetcher>, AppError> {
    config.validate()?;
    let fetcher = ApiFetcher::from_config(config).map_err(SyncError::from)?;
    Ok(Arc::new(fetcher))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Internal(format!("Cannot render output: {}", e)))?;
    println!("{}", body);
    Ok(())
}

async fn preflight(config: &Config) -> Result<(), AppError> {
    let source = open_source(config)?;
    let store = open_store(config).await?;

    let report = run_preflight(source.as_ref(), store.as_ref()).await;
    print_json(&report)?;
    report.into_result()?;
    Ok(())
}

async fn sync(config: &Config, mode: SyncMode, dry_run: bool) -> Result<(), AppError> {
    let source: Arc<dyn MemberSource> = open_source(config)?;
    let store: Arc<dyn LocalStore> = open_store(config).await?;

    let orchestrator = SyncOrchestrator::new(source, Arc::clone(&store), config.sync.clone());
    let report = orchestrator.run_checked(mode, dry_run).await?;

    let writer = ReportWriter::new(&config.sync.report_dir);
    let path = writer.write(&report).await?;

    // Check what was written, not what is in memory
    let written = ReportWriter::read_value(&path).await?;
    let mut violations = validate_report(&written);
    violations.extend(verify_store(store.as_ref(), Some(&report)).await?.violations);
    for violation in &violations {
        warn!(code = ?violation.code, path = %violation.path, message = %violation.message, "Invariant violated");
    }

    println!("{}", path.display());
    print_summary(&report);

    assert_no_violations(&violations)?;
    if !report.success {
        return Err(AppError::Internal(format!(
            "Sync run {} failed; see {}",
            report.run_id,
            path.display()
        )));
    }
    Ok(())
}

fn print_summary(report: &SyncReport) {
    println!(
        "run {} ({}{}): success={} members +{}/~{} events +{}/~{} registrations +{}/~{} errors={} warnings={}",
        report.run_id,
        report.mode,
        if report.dry_run { ", dry run" } else { "" },
        report.success,
        report.stats.members.created,
        report.stats.members.updated,
        report.stats.events.created,
        report.stats.events.updated,
        report.stats.registrations.created,
        report.stats.registrations.updated,
        report.total_error_count,
        report.warnings.len(),
    );
}

async fn stale(config: &Config, days: u32, cleanup: bool, dry_run: bool) -> Result<(), AppError> {
    let store = open_store(config).await?;
    let now = Utc::now();

    if cleanup {
        let result = cleanup_stale_mappings(store.as_ref(), days, dry_run, now).await?;
        print_json(&result)
    } else {
        let stale = detect_stale(store.as_ref(), days, None, now).await?;
        print_json(&stale)
    }
}

async fn validate(path: &Path) -> Result<(), AppError> {
    let value = ReportWriter::read_value(path).await?;
    let violations = validate_report(&value);
    print_json(&violations)?;
    assert_no_violations(&violations)?;
    info!(path = %path.display(), "Report is valid");
    Ok(())
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, abandoning the run");
        }
        _ = terminate => {
            warn!("Received SIGTERM, abandoning the run");
        }
    }
}
