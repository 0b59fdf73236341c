//! CLI command definitions, routing, and tracing setup.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use companyinfo_core::pipeline::{PipelineResult, ProgressReporter, run_pipeline};
use companyinfo_shared::{
    AppConfig, SecurityId, init_config, load_config, load_config_from, validate_api_key,
};
use companyinfo_sources::{
    GeminiClassifier, HttpSession, HttpSources, TabularSources, WebDetailSource,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// companyinfo: unified company metadata for Taiwan-listed securities.
#[derive(Parser)]
#[command(
    name = "companyinfo",
    version,
    about = "Merge registry, weight, detail-page and concept data into one company table.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.companyinfo/companyinfo.toml).
    #[arg(long, global = true, env = "COMPANYINFO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Run the full pipeline and write the output table.
    Run(RunArgs),

    /// Print the constituent weights of one or more ETFs.
    Etf {
        /// Fund identifiers, e.g. 0050 00878.
        #[arg(required = true)]
        fund_ids: Vec<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Overrides for `run`.
#[derive(Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// Base table CSV.
    #[arg(short, long)]
    pub input: Option<String>,

    /// Output CSV.
    #[arg(short, long)]
    pub output: Option<String>,

    /// Skip detail pages and the group index.
    #[arg(long)]
    pub no_detail: bool,

    /// Skip concept classification (no API key needed).
    #[arg(long)]
    pub no_classify: bool,

    /// Identifiers per classification request.
    #[arg(long)]
    pub batch_size: Option<usize>,
}

impl RunArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(input) = &self.input {
            config.paths.input = input.clone();
        }
        if let Some(output) = &self.output {
            config.paths.output = output.clone();
        }
        if self.no_detail {
            config.detail.enabled = false;
        }
        if self.no_classify {
            config.classification.enabled = false;
        }
        if let Some(size) = self.batch_size {
            config.classification.batch_size = size;
        }
    }
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
        0 => "companyinfo=info",
        1 => "companyinfo=debug",
        _ => "companyinfo=trace",
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
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run(args) => cmd_run(config_path, &args).await,
        Command::Etf { fund_ids } => cmd_etf(config_path, &fund_ids).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>, args: &RunArgs) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    args.apply(&mut config);
    if config.classification.batch_size == 0 {
        return Err(eyre!("--batch-size must be at least 1"));
    }

    // Credentials are checked before any fetch.
    dotenvy::dotenv().ok();
    let classifier = if config.classification.enabled {
        let api_key = validate_api_key(&config)?;
        Some(GeminiClassifier::new(
            &config.http,
            &config.classification,
            api_key,
        )?)
    } else {
        None
    };

    let sources = HttpSources::new(&config)?;
    let detail = if config.detail.enabled {
        let session = HttpSession::new(&config.http, &config.detail)?;
        Some(WebDetailSource::new(session, config.detail.clone()))
    } else {
        None
    };

    info!(
        input = %config.paths.input,
        output = %config.paths.output,
        detail = config.detail.enabled,
        classify = config.classification.enabled,
        "running pipeline"
    );

    let reporter = CliProgress::new();
    let result = run_pipeline(
        &config,
        &sources,
        detail.as_ref(),
        classifier.as_ref(),
        &reporter,
    )
    .await?;

    print_summary(&result);
    Ok(())
}

fn print_summary(result: &PipelineResult) {
    println!();
    println!("  Company table written!");
    println!("  Run:       {}", result.run_id);
    println!("  Records:   {}", result.records.len());
    for (source, rows) in &result.source_rows {
        println!("  {source:<10} {rows} rows");
    }
    if let Some(stats) = &result.enrichment {
        println!(
            "  Details:   {} ok, {} failed, {} skipped{}",
            stats.succeeded,
            stats.failed,
            stats.skipped,
            if stats.aborted { " (stopped early)" } else { "" }
        );
        println!("  Groups:    {}", stats.grouped);
    }
    if let Some(stats) = &result.classification {
        println!(
            "  Concepts:  {} matched, {}/{} batches failed",
            stats.matched, stats.batches_failed, stats.batches
        );
    }
    println!("  Output:    {}", result.output.display());
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
    println!();
}

async fn cmd_etf(config_path: Option<&Path>, fund_ids: &[String]) -> Result<()> {
    let config = resolve_config(config_path)?;
    let sources = HttpSources::new(&config)?;

    for fund in fund_ids {
        info!(fund = %fund, "fetching ETF constituents");
        let weights = sources.etf_weights(fund).await;
        if weights.is_empty() {
            println!("ETF {fund}: no constituents found");
            continue;
        }

        let mut rows: Vec<(&SecurityId, &String)> = weights.iter().collect();
        rows.sort_by(|a, b| by_weight_desc(a.1, b.1).then_with(|| a.0.cmp(b.0)));

        println!("ETF {fund} ({} constituents)", rows.len());
        for (id, weight) in rows {
            println!("  {:<8} {weight}", id.as_str());
        }
        println!();
    }
    Ok(())
}

/// Numeric weights first, heaviest first.
fn by_weight_desc(a: &str, b: &str) -> Ordering {
    let parse = |w: &str| w.trim().trim_end_matches('%').parse::<f64>().ok();
    match (parse(a), parse(b)) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

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
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_progress(&self, current: usize, total: usize, detail: &str) {
        self.spinner
            .set_message(format!("[{current}/{total}] {detail}"));
    }

    fn done(&self, _result: &PipelineResult) {
        self.spinner.finish_and_clear();
    }
}
