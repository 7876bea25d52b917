//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use officefinder_core::{AddressPipeline, BatchProgress, BatchSummary, PipelineConfig, run_batch};
use officefinder_research::{HttpFetcher, HttpProbe, OpenRouterFormatter, SerperClient};
use officefinder_shared::{
    AddressResult, AppConfig, CompanyRecord, Resolution, ResolverConfig, init_config, load_config,
    load_config_from, validate_api_keys,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// OfficeFinder: resolve and corroborate company office addresses.
#[derive(Parser)]
#[command(
    name = "officefinder",
    version,
    about = "Resolve office addresses for a list of companies, resuming where the last run stopped.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file to use instead of ~/.officefinder/officefinder.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Process at most this many records in this run.
    #[arg(long, global = true)]
    pub limit: Option<usize>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Defaults to `run`.
    #[command(subcommand)]
    pub command: Option<Command>,
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
    /// Resolve the next batch of companies and append them to the ledger.
    Run,

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
        0 => "officefinder=info",
        1 => "officefinder=debug",
        _ => "officefinder=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        None | Some(Command::Run) => cmd_run(cli.config.as_deref(), cli.limit).await,
        Some(Command::Config { action }) => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => {
            if !path.exists() {
                return Err(eyre!("config file '{}' does not exist", path.display()));
            }
            load_config_from(path)?
        }
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>, limit: Option<usize>) -> Result<()> {
    let config = resolve_config(config_path)?;
    // Fail on missing keys before touching the ledger.
    let credentials = validate_api_keys(&config)?;

    let mut resolver = ResolverConfig::from(&config);
    if limit.is_some() {
        resolver.max_records = limit;
    }

    let research = SerperClient::new(&config.serper, credentials.serper_api_key.clone())?;
    let formatter =
        OpenRouterFormatter::new(&config.openrouter, credentials.openrouter_api_key.clone())?;
    let fetcher = HttpFetcher::new(Duration::from_secs(config.probe.page_timeout_secs))?;
    let probe = HttpProbe::new(Duration::from_secs(config.probe.timeout_secs))?;

    let pipeline = AddressPipeline::new(
        PipelineConfig::from(&resolver),
        Arc::new(research),
        Arc::new(formatter),
        Arc::new(fetcher),
        Arc::new(probe),
    );

    info!(
        input = %resolver.input_path.display(),
        ledger = %resolver.ledger_path.display(),
        model = %config.openrouter.default_model,
        "resolving addresses"
    );

    let reporter = CliProgress::new();
    let summary = run_batch(&resolver, &pipeline, &reporter).await?;

    println!();
    println!("  Run complete");
    println!("  Started at:  row {}", summary.offset);
    println!("  Processed:   {} of {}", summary.processed, summary.pending);
    println!("  Found:       {}", summary.found);
    println!("  Not found:   {}", summary.not_found);
    println!("  Failed:      {}", summary.failed);
    println!("  Ledger:      {}", resolver.ledger_path.display());
    println!("  Time:        {:.1}s", summary.elapsed.as_secs_f64());
    if summary.halted_on_rate_limit {
        println!();
        println!("  Stopped early: an API rate limit was reached.");
        println!("  Run again later to continue from row {}.", summary.offset + summary.processed);
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .expect("valid progress template")
                .progress_chars("=> ")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }
}

impl BatchProgress for CliProgress {
    fn started(&self, offset: usize, pending: usize) {
        self.bar.set_length(pending as u64);
        self.bar.set_message(format!("resuming at row {offset}"));
    }

    fn record_started(&self, position: usize, company: &CompanyRecord) {
        self.bar
            .set_message(format!("[row {position}] {}", company.name));
    }

    fn record_finished(&self, _position: usize, company: &CompanyRecord, result: &AddressResult) {
        let line = match &result.resolution {
            Resolution::Found { address } => format!("  {}: {address}", company.name),
            Resolution::NotFound => format!("  {}: not found", company.name),
            Resolution::Failed { reason } => format!("  {}: failed ({reason})", company.name),
            Resolution::RateLimited => format!("  {}: rate limited", company.name),
        };
        self.bar.println(line);
        if !result.resolution.is_rate_limited() {
            self.bar.inc(1);
        }
    }

    fn finished(&self, _summary: &BatchSummary) {
        self.bar.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
