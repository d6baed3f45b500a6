//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use contactscrub_core::{JobOutcome, ProgressReporter, process_job};
use contactscrub_inference::{InferenceClient, InferenceConfig};
use contactscrub_shared::{AppConfig, JobId, init_config, load_config};
use contactscrub_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ContactScrub — deduplicate and enrich contact tables.
#[derive(Parser)]
#[command(
    name = "contactscrub",
    version,
    about = "Deduplicate CSV contact tables and enrich them with derived fields.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database path (defaults to the configured db_path).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Clean a CSV contact file: create a job and run it to completion.
    Process {
        /// Path to the source CSV file.
        file: PathBuf,
    },

    /// Show the status of a job.
    Status {
        /// Job identifier.
        job_id: String,
    },

    /// List all jobs.
    List,

    /// Export a job's cleaned records as CSV.
    Export {
        /// Job identifier.
        job_id: String,

        /// Output file (defaults to stdout).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "contactscrub=info",
        1 => "contactscrub=debug",
        _ => "contactscrub=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Process { file } => cmd_process(&file, cli.db.as_deref()).await,
        Command::Status { job_id } => cmd_status(&job_id, cli.db.as_deref()).await,
        Command::List => cmd_list(cli.db.as_deref()).await,
        Command::Export { job_id, out } => {
            cmd_export(&job_id, out.as_deref(), cli.db.as_deref()).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Resolve the database path: CLI flag, else configured default.
fn resolve_db(cli_db: Option<&Path>, config: &AppConfig) -> PathBuf {
    match cli_db {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(&config.defaults.db_path),
    }
}

fn parse_job_id(job_id: &str) -> Result<JobId> {
    job_id
        .parse()
        .map_err(|e| eyre!("invalid job id '{job_id}': {e}"))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_process(file: &Path, cli_db: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let db_path = resolve_db(cli_db, &config);

    let inference_config = InferenceConfig::from_settings(&config.inference);
    if inference_config.api_key.is_none() {
        warn!(
            env = %config.inference.api_key_env,
            "no API key set; records get deterministic enrichment only"
        );
    }

    let storage = Storage::open(&db_path).await?;
    let client = InferenceClient::new(inference_config)?;

    let filename = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| eyre!("'{}' has no file name", file.display()))?;

    let job = storage.create_job(&filename).await?;
    info!(job_id = %job.id, file = %file.display(), "processing contact table");

    let reporter = CliProgress::new();
    let outcome = process_job(&job.id, file, &storage, &client, &reporter).await?;

    println!();
    println!("  Job completed!");
    println!("  ID:        {}", outcome.job_id);
    println!("  Rows:      {}", outcome.total_rows);
    println!("  Cleaned:   {}", outcome.cleaned_rows);
    if outcome.summary.inference_degraded {
        println!("  Enriched:  deterministic fields only (inference degraded)");
    } else {
        println!(
            "  Enriched:  {} inference fields populated",
            outcome.summary.inference_fields_populated
        );
    }
    println!("  Time:      {:.1}s", outcome.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_status(job_id: &str, cli_db: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open(&resolve_db(cli_db, &config)).await?;

    let id = parse_job_id(job_id)?;
    let job = storage
        .get_job(&id)
        .await?
        .ok_or_else(|| eyre!("job '{job_id}' not found"))?;

    println!("  ID:        {}", job.id);
    println!("  File:      {}", job.filename);
    println!("  Status:    {}", job.status);
    println!("  Rows:      {} total, {} processed", job.total_rows, job.processed);
    if let Some(summary) = &job.result {
        println!(
            "  Result:    {} cleaned, {} inference fields, degraded: {}",
            summary.cleaned_rows,
            summary.inference_fields_populated,
            summary.inference_degraded
        );
    }
    if let Some(error) = &job.error {
        println!("  Error:     {error}");
    }

    Ok(())
}

async fn cmd_list(cli_db: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open(&resolve_db(cli_db, &config)).await?;

    let jobs = storage.list_jobs().await?;
    if jobs.is_empty() {
        println!("No jobs yet. Run `contactscrub process <file.csv>` to create one.");
        return Ok(());
    }

    for job in jobs {
        println!(
            "{}  {:<12} {:>6}/{:<6} {}",
            job.id, job.status, job.processed, job.total_rows, job.filename
        );
    }
    Ok(())
}

async fn cmd_export(job_id: &str, out: Option<&Path>, cli_db: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open(&resolve_db(cli_db, &config)).await?;

    let id = parse_job_id(job_id)?;
    let job = storage
        .get_job(&id)
        .await?
        .ok_or_else(|| eyre!("job '{job_id}' not found"))?;

    let records = storage.list_cleaned_contacts(&id).await?;
    if records.is_empty() {
        return Err(eyre!(
            "no cleaned records for job '{job_id}' (status: {})",
            job.status
        ));
    }

    let csv = contactscrub_table::encode(&records);
    match out {
        Some(path) => {
            std::fs::write(path, &csv)
                .map_err(|e| eyre!("cannot write '{}': {e}", path.display()))?;
            println!("Exported {} records to {}", records.len(), path.display());
        }
        None => print!("{csv}"),
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn record_enriched(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Enriching [{current}/{total}]"));
    }

    fn done(&self, _outcome: &JobOutcome) {
        self.spinner.finish_and_clear();
    }
}
