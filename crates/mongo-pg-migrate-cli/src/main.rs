//! mongo-pg-migrate CLI - resumable document-store to PostgreSQL migration.

use clap::{Parser, Subcommand};
use mongo_pg_migrate::checkpoint::CheckpointStore;
use mongo_pg_migrate::idmap::IdMapper;
use mongo_pg_migrate::store::{JsonlSource, MemoryTarget, PgTarget, SourceStore, TargetStore};
use mongo_pg_migrate::{Config, MigrateError, Orchestrator, Validator};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mongo-pg-migrate")]
#[command(about = "One-shot, resumable CRM dataset migration to PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration (resumes automatically from the checkpoint)
    Run {
        /// Discard any previous checkpoint and error journal first
        #[arg(long)]
        clean: bool,

        /// Read and transform everything, write nothing durable
        #[arg(long)]
        dry_run: bool,
    },

    /// Audit a completed migration (four-layer validation report)
    Validate,

    /// Check source export directory and target connectivity
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let cancel_token = setup_signal_handler();

    match cli.command {
        Commands::Run { clean, dry_run } => {
            let source: Arc<dyn SourceStore> = Arc::new(JsonlSource::new(&config.source.dir)?);
            let target: Arc<dyn TargetStore> = if dry_run {
                // A throwaway in-memory target: the whole pipeline runs,
                // nothing durable is written.
                Arc::new(MemoryTarget::new())
            } else {
                Arc::new(PgTarget::new(&config.target).await?)
            };

            let orchestrator = Orchestrator::new(config, source, target)
                .with_cancellation_token(cancel_token)
                .with_clean(clean)
                .with_dry_run(dry_run);
            let result = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                let status = if dry_run {
                    "Dry run completed!"
                } else if result.resumed {
                    "Migration resumed and completed!"
                } else {
                    "Migration completed!"
                };
                println!("\n{status}");
                println!("  Tables: {}", result.tables_completed);
                println!("  Records: {}", result.total_records_migrated);
                println!("  Errors: {}", result.total_errors);
                println!("  Duration: {:.2}s", result.duration_secs);
                if result.total_errors > 0 {
                    println!("  See the error journal for per-record details.");
                }
            }
        }

        Commands::Validate => {
            let state = CheckpointStore::new(&config.migration.checkpoint_file)
                .load()
                .ok_or_else(|| {
                    MigrateError::Checkpoint(
                        "No checkpoint found - run the migration first".to_string(),
                    )
                })?;
            let mapper = IdMapper::restore(&state.object_id_to_uuid_map)?;

            let source = JsonlSource::new(&config.source.dir)?;
            let target = PgTarget::new(&config.target).await?;
            let validator =
                Validator::new(&source, &target, mapper, config.migration.sample_size);
            let report = validator.run().await?;
            report.save(&config.migration.report_file)?;
            info!("Report written to {:?}", config.migration.report_file);

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nValidation report:");
                for layer in &report.layers {
                    println!(
                        "  Layer {} ({}): {:?} - {} checked, {} discrepancies",
                        layer.layer,
                        layer.name,
                        layer.status,
                        layer.checked,
                        layer.discrepancy_count
                    );
                    for detail in &layer.discrepancies {
                        println!("    - {detail}");
                    }
                }
                println!("\n  Overall: {:?}", report.overall);
            }

            if !report.passed() {
                let total: u64 = report.layers.iter().map(|l| l.discrepancy_count).sum();
                return Err(MigrateError::Validation(format!(
                    "{total} discrepancies found"
                )));
            }
        }

        Commands::HealthCheck => {
            let source_result = JsonlSource::new(&config.source.dir);

            let start = std::time::Instant::now();
            let target_result = PgTarget::new(&config.target).await;
            let target_latency_ms = start.elapsed().as_millis() as u64;

            let healthy = source_result.is_ok() && target_result.is_ok();
            if cli.output_json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "sourceOk": source_result.is_ok(),
                        "sourceError": source_result.err().map(|e| e.to_string()),
                        "targetOk": target_result.is_ok(),
                        "targetError": target_result.err().map(|e| e.to_string()),
                        "targetLatencyMs": target_latency_ms,
                        "healthy": healthy,
                    }))?
                );
            } else {
                println!("Health Check Results:");
                match &source_result {
                    Ok(_) => println!("  Source (JSONL export): OK"),
                    Err(e) => println!("  Source (JSONL export): FAILED\n    Error: {e}"),
                }
                match &target_result {
                    Ok(_) => println!("  Target (PostgreSQL): OK ({target_latency_ms}ms)"),
                    Err(e) => println!("  Target (PostgreSQL): FAILED\n    Error: {e}"),
                }
                println!(
                    "\n  Overall: {}",
                    if healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !healthy {
                return Err(MigrateError::Config("Health check failed".to_string()));
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Returns a token cancelled on the first SIGINT/SIGTERM. A second signal
/// aborts immediately without waiting for the checkpoint save.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        eprintln!("\nSignal received. Finishing the current batch and saving the checkpoint...");
        token.cancel();

        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        eprintln!("\nSecond signal received. Aborting now.");
        std::process::exit(130);
    });

    cancel_token
}

#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to setup Ctrl-C handler");
        eprintln!("\nCtrl-C received. Finishing the current batch and saving the checkpoint...");
        token.cancel();
    });

    cancel_token
}
