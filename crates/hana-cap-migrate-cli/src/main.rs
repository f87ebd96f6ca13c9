//! hana-cap-migrate CLI - SAP HANA export bundle to CAP project migration.

use clap::{Parser, Subcommand};
use hana_cap_migrate::client;
use hana_cap_migrate::pipeline::{self, DataStageReport, SchemaStageReport};
use hana_cap_migrate::{
    ClientKind, Config, ExecutionOptions, ExecutionSummary, FileSelection, MigrateError,
    Orchestrator, Overrides,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

const DEFAULT_CONFIG: &str = "config.yaml";

#[derive(Parser)]
#[command(name = "hana-cap-migrate")]
#[command(about = "Migrate a SAP HANA export bundle into a CAP project")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file [default: config.yaml, if present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Schema name inside the bundle (auto-detected when omitted)
    #[arg(long)]
    schema: Option<String>,

    /// Export bundle (.tar.gz)
    #[arg(long)]
    archive: Option<PathBuf>,

    /// Extraction cache directory
    #[arg(long)]
    extract_dir: Option<PathBuf>,

    /// CAP project root
    #[arg(long)]
    project_root: Option<PathBuf>,

    /// Statement-file directory
    #[arg(long)]
    sql_dir: Option<PathBuf>,

    /// Log directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Database client: hdbsql or postgres
    #[arg(long)]
    client: Option<ClientKind>,

    /// Per-statement timeout in seconds (unbounded when unset)
    #[arg(long)]
    timeout: Option<u64>,

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

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            archive_path: self.archive.clone(),
            extract_dir: self.extract_dir.clone(),
            schema: self.schema.clone(),
            project_root: self.project_root.clone(),
            sql_dir: self.sql_dir.clone(),
            log_dir: self.log_dir.clone(),
            client_kind: self.client,
            timeout_secs: self.timeout,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the CDS schema file from the bundle
    Schema,

    /// Generate INSERT statement-files from the bundle's data
    Generate,

    /// Replay statement-files against the database
    Execute {
        /// Files to replay, relative to the statement directory [default: all]
        files: Vec<String>,
    },

    /// Schema, data generation and replay in one go
    Run,

    /// Test the database connection
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

    let config = load_config(cli.config.as_deref(), &cli.overrides())?;

    match &cli.command {
        Commands::Schema => {
            let layout = pipeline::prepare_archive(&config)?;
            let report = pipeline::generate_schema(&config, &layout)?;
            print_schema(&report, cli.output_json)?;
        }

        Commands::Generate => {
            let layout = pipeline::prepare_archive(&config)?;
            let report = pipeline::generate_data(&config, &layout)?;
            print_data(&report, cli.output_json)?;
        }

        Commands::Execute { files } => {
            config.validate_client()?;
            let cancel = setup_signal_handler()?;
            let selection = FileSelection::from_names(files.clone());
            let summary = execute(&config, &selection, cancel).await?;
            print_summary(&summary, cli.output_json)?;
            if let Some(e) = summary.error() {
                return Err(e);
            }
        }

        Commands::Run => {
            config.validate_client()?;
            let cancel = setup_signal_handler()?;
            let layout = pipeline::prepare_archive(&config)?;
            let schema = pipeline::generate_schema(&config, &layout)?;
            let data = pipeline::generate_data(&config, &layout)?;
            if cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }
            let summary = execute(&config, &FileSelection::All, cancel).await?;

            if cli.output_json {
                let out = json!({ "schema": schema, "data": data, "execution": summary });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_schema(&schema, false)?;
                print_data(&data, false)?;
                print_summary(&summary, false)?;
            }
            if let Some(e) = summary.error() {
                return Err(e);
            }
        }

        Commands::HealthCheck => {
            config.validate_client()?;
            let start = std::time::Instant::now();
            let result = match client::connect(&config.client).await {
                Ok(db) => db.health_check().await.map(|()| db.describe()),
                Err(e) => Err(e),
            };
            let latency_ms = start.elapsed().as_millis() as u64;

            if cli.output_json {
                let out = json!({
                    "healthy": result.is_ok(),
                    "client": result.as_ref().ok(),
                    "latency_ms": latency_ms,
                    "error": result.as_ref().err().map(|e| e.to_string()),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("Health Check Results:");
                match &result {
                    Ok(client) => println!("  {}: OK ({}ms)", client, latency_ms),
                    Err(e) => println!("  FAILED ({}ms): {}", latency_ms, e),
                }
            }
            result?;
        }
    }

    Ok(())
}

/// Defaults, then the YAML file, then the environment, then command-line flags.
fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<Config, MigrateError> {
    let mut config = match path {
        Some(path) => Config::load(path)?,
        None if Path::new(DEFAULT_CONFIG).is_file() => Config::load(DEFAULT_CONFIG)?,
        None => Config::default(),
    };
    if let Some(path) = path {
        info!("Loaded configuration from {:?}", path);
    }
    config.apply_env()?;
    config.apply_overrides(overrides);
    config.validate()?;
    Ok(config)
}

async fn execute(
    config: &Config,
    selection: &FileSelection,
    cancel: CancellationToken,
) -> Result<ExecutionSummary, MigrateError> {
    let db = client::connect(&config.client).await?;
    let orchestrator = Orchestrator::new(db, ExecutionOptions::from_config(config));
    orchestrator.run(selection, cancel).await
}

fn print_schema(report: &SchemaStageReport, as_json: bool) -> Result<(), MigrateError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("\nSchema generated!");
    println!("  Schema: {}", report.schema);
    println!("  Entities: {}", report.output.entities);
    println!("  File: {}", report.output.path.display());
    if let Some(backup) = &report.output.backup {
        println!("  Backup: {}", backup.display());
    }
    print_build_issues(&report.build);
    Ok(())
}

fn print_data(report: &DataStageReport, as_json: bool) -> Result<(), MigrateError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("\nStatement files generated!");
    if let Some(target) = &report.target_schema {
        println!("  Target schema: {}", target);
    }
    println!("  Files: {}", report.data.files_written());
    println!("  Rows: {}", report.data.rows());
    println!("  Rows skipped: {}", report.data.skipped_rows());
    for table in report.data.tables.iter().filter(|t| !t.warnings.is_empty()) {
        println!("  {}: {} warning(s)", table.table, table.warnings.len());
    }
    Ok(())
}

fn print_build_issues(build: &hana_cap_migrate::schema::BuildReport) {
    if !build.skipped.is_empty() {
        println!("  Skipped tables:");
        for skipped in &build.skipped {
            println!("    {}: {}", skipped.table, skipped.reason);
        }
    }
    if !build.warnings.is_empty() {
        println!("  Warnings: {}", build.warnings.len());
    }
}

fn print_summary(summary: &ExecutionSummary, as_json: bool) -> Result<(), MigrateError> {
    if as_json {
        println!("{}", summary.to_json()?);
        return Ok(());
    }
    println!("\nExecution {}!", summary.status);
    println!("  Run ID: {}", summary.run_id);
    println!("  Duration: {:.2}s", summary.duration_seconds);
    println!(
        "  Files: {} succeeded, {} failed, {} skipped of {}",
        summary.files_succeeded, summary.files_failed, summary.files_skipped, summary.files_total
    );
    println!(
        "  Statements: {} applied ({} duplicate), {} failed ({} timed out)",
        summary.statements_applied,
        summary.statements_duplicate,
        summary.statements_failed,
        summary.statements_timed_out
    );
    if !summary.failed_files.is_empty() {
        println!("  Failed files: {:?}", summary.failed_files);
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

    // stdout carries results, logs go to stderr
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

/// Cancel the returned token on SIGINT or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!("\nReceived {}. Stopping replay...", name);
        token.cancel();
    });

    Ok(cancel_token)
}

/// Ctrl-C only outside unix.
#[cfg(not(unix))]
fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping replay...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
