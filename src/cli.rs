use crate::config::{CliOverrides, Config, ReportFormat};
use crate::error::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "covid19-scrapers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Collect COVID-19 case and death counts by race from state health departments")]
#[command(
    long_about = "Runs one scraper per U.S. state, pulls the latest published case and death \
                  counts for African-American residents, and writes one normalized table \
                  for the whole run."
)]
#[command(after_help = "EXAMPLES:\n  \
    covid19-scrapers\n  \
    covid19-scrapers Florida Georgia --output reports\n  \
    covid19-scrapers --include-beta --report-format json\n  \
    covid19-scrapers --refresh --validation-dir artifacts -v\n  \
    covid19-scrapers --list")]
pub struct Cli {
    /// States to scrape (default: every stable scraper)
    pub states: Vec<String>,

    /// Directory the dated report folder is created in
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Console output style
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Format of the results file
    #[arg(long, value_enum)]
    pub report_format: Option<ReportFormat>,

    /// Ignore cached responses and download everything again
    #[arg(long)]
    pub refresh: bool,

    /// Never read or write the response cache
    #[arg(long, conflicts_with = "refresh")]
    pub no_cache: bool,

    /// Where cached responses are stored
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Save each scraper's raw source documents here
    #[arg(long)]
    pub validation_dir: Option<PathBuf>,

    /// HTTP timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Also run scrapers marked as beta
    #[arg(long)]
    pub include_beta: bool,

    /// List available scrapers and exit
    #[arg(long)]
    pub list: bool,

    /// Verbose output level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Overwrite an existing report directory for today
    #[arg(long)]
    pub force: bool,

    /// Show which scrapers would run without fetching anything
    #[arg(long)]
    pub dry_run: bool,

    /// Generate sample configuration file
    #[arg(long)]
    pub generate_config: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        let states = (!self.states.is_empty()).then(|| self.states.clone());
        let include_beta = self.include_beta.then_some(true);
        let use_cache = self.no_cache.then_some(false);

        CliOverrides::new()
            .with_states(states)
            .with_include_beta(include_beta)
            .with_output_dir(self.output.clone())
            .with_report_format(self.report_format)
            .with_validation_dir(self.validation_dir.clone())
            .with_timeout(self.timeout)
            .with_use_cache(use_cache)
            .with_cache_dir(self.cache_dir.clone())
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
