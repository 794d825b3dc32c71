pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod pdf;
pub mod pipeline;
pub mod reconcile;
pub mod record;
pub mod report;
pub mod scraper;
pub mod states;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, OutputFormat};
pub use config::{CliOverrides, Config, FetchConfig, OutputConfig, ReportFormat, ScrapersConfig};
pub use error::{Result, ScrapeError, UserFriendlyError};

// Core functionality re-exports
pub use fetch::{Fetch, HttpFetcher, StaticFetcher};
pub use pipeline::ScraperOutcome;
pub use record::{Record, ResultTable};
pub use report::{ConfigSnapshot, ReportManager, RunReport};
pub use scraper::{ScrapeContext, Scraper};
pub use ui::{GracefulShutdown, OutputFormatter, OutputMode, ProgressManager};

use std::path::Path;
use std::time::Instant;
use tokio::task;

/// Library entry point: one configured run over the selected scrapers.
pub struct Covid19Scrapers {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
    shutdown: GracefulShutdown,
    refresh: bool,
    force: bool,
}

impl Covid19Scrapers {
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Result<Self> {
        let shutdown = GracefulShutdown::new()?;
        Ok(Self::with_shutdown(config, output_mode, verbose, quiet, shutdown))
    }

    /// No signal handler, so tests can build as many as they like.
    pub fn new_for_test(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        Self::with_shutdown(config, output_mode, verbose, quiet, GracefulShutdown::new_for_test())
    }

    fn with_shutdown(
        config: Config,
        output_mode: OutputMode,
        verbose: u8,
        quiet: bool,
        shutdown: GracefulShutdown,
    ) -> Self {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        // Bars would interleave with JSON lines on stdout.
        let progress_manager = ProgressManager::new(!quiet && output_mode != OutputMode::Json);

        Self {
            config,
            output_formatter,
            progress_manager,
            shutdown,
            refresh: false,
            force: false,
        }
    }

    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        let output_mode = match cli_args.output_format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        };

        Ok(Self::new(config, output_mode, cli_args.verbose, cli_args.quiet)?
            .with_refresh(cli_args.refresh)
            .with_force(cli_args.force))
    }

    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Run every selected scraper and write the dated report directory.
    pub async fn run(&self) -> Result<RunReport> {
        let start_time = Instant::now();
        self.shutdown.check_shutdown()?;

        let scrapers = states::select_scrapers(
            &self.config.scrapers.states,
            self.config.scrapers.include_beta,
        )?;

        let report_date = chrono::Local::now().date_naive();
        let report_manager = ReportManager::new(
            self.config.output.base_directory.clone(),
            report_date,
            self.config.output.format,
        )?
        .with_force_overwrite(self.force);
        report_manager.initialize()?;

        self.output_formatter.start_operation(&format!(
            "Running {} scraper(s)",
            scrapers.len()
        ));

        let progress = self.progress_manager.create_batch_progress(scrapers.len() as u64);
        let fetch_config = self.config.fetch.clone();
        let validation_dir = self.config.output.validation_dir.clone();
        let refresh = self.refresh;
        let shutdown = self.shutdown.clone();
        let pb = progress.clone();

        // The blocking HTTP client must be created and dropped off the runtime.
        let outcomes = task::spawn_blocking(move || {
            let fetcher = HttpFetcher::new(&fetch_config)?;
            let ctx = ScrapeContext::new(&fetcher)
                .with_refresh(refresh)
                .with_validation_dir(validation_dir);
            pipeline::run_batch(&scrapers, &ctx, &shutdown, |outcome| {
                ui::progress::update_batch_progress(&pb, outcome);
            })
        })
        .await
        .map_err(|e| ScrapeError::Config {
            message: format!("Scraper task failed: {}", e),
        })??;

        ui::progress::finish_progress_with_summary(
            &progress,
            &format!("Ran {} scraper(s)", outcomes.len()),
            start_time.elapsed(),
        );
        self.output_formatter.print_run_summary(&outcomes);

        let snapshot = self.create_config_snapshot();
        let report =
            report_manager.write_report(&outcomes, start_time.elapsed(), &snapshot, report_date)?;

        self.output_formatter.success(&format!(
            "Wrote {}",
            report.results_file.display()
        ));

        Ok(report)
    }

    fn create_config_snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            states: self.config.scrapers.states.clone(),
            include_beta: self.config.scrapers.include_beta,
            refresh: self.refresh,
            use_cache: self.config.fetch.use_cache,
            report_format: self.config.output.format,
            validation_dir: self.config.output.validation_dir.clone(),
        }
    }

    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let sample_config = Config::create_sample_config();
        std::fs::write(output_path.as_ref(), sample_config)?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_running()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.request_shutdown();
    }

    pub fn handle_error(&self, error: &ScrapeError) {
        self.output_formatter.print_user_friendly_error(error);
    }
}

pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
