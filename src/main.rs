use clap::Parser;
use covid19_scrapers::{
    states, Cli, Covid19Scrapers, OutputFormatter, OutputMode, ScrapeError, UserFriendlyError,
};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "covid19_scrapers.toml";

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = Cli::parse();
    setup_logging(&cli);

    if cli.generate_config {
        return handle_generate_config(&cli);
    }

    if cli.list {
        return handle_list(&cli);
    }

    let app = match Covid19Scrapers::from_cli(&cli) {
        Ok(app) => app,
        Err(e) => {
            print_startup_error(&e);
            return exit_code_for(&e);
        }
    };

    if cli.dry_run {
        return handle_dry_run(&cli, &app);
    }

    match app.run().await {
        Ok(report) => {
            app.output_formatter().print_run_report(&report);
            if report.has_failures() {
                2
            } else {
                0
            }
        }
        Err(e) => {
            app.handle_error(&e);
            exit_code_for(&e)
        }
    }
}

fn exit_code_for(error: &ScrapeError) -> i32 {
    match error {
        ScrapeError::Cancelled => 130,
        ScrapeError::Config { .. } => 3,
        ScrapeError::UnknownState { .. } | ScrapeError::NoScrapersSelected { .. } => 4,
        ScrapeError::OutputDirectoryExists { .. } => 8,
        _ => 1,
    }
}

fn setup_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn output_mode(cli: &Cli) -> OutputMode {
    match cli.output_format {
        covid19_scrapers::OutputFormat::Human => OutputMode::Human,
        covid19_scrapers::OutputFormat::Json => OutputMode::Json,
        covid19_scrapers::OutputFormat::Plain => OutputMode::Plain,
    }
}

fn handle_generate_config(cli: &Cli) -> i32 {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    match Covid19Scrapers::generate_sample_config(&config_path) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", config_path.display());
            println!("\nTo use this configuration:");
            println!("  covid19-scrapers --config {}", config_path.display());
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {}", e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            1
        }
    }
}

fn handle_list(cli: &Cli) -> i32 {
    let formatter = OutputFormatter::new(output_mode(cli), cli.verbose, false);
    formatter.print_scraper_list(&states::all_scrapers());
    0
}

fn handle_dry_run(cli: &Cli, app: &Covid19Scrapers) -> i32 {
    let formatter = app.output_formatter();
    let config = app.config();

    formatter.info("DRY RUN MODE - nothing will be fetched");
    formatter.print_separator();

    let selected = match states::select_scrapers(&config.scrapers.states, config.scrapers.include_beta)
    {
        Ok(selected) => selected,
        Err(e) => {
            app.handle_error(&e);
            return exit_code_for(&e);
        }
    };

    println!("Scrapers that would run:");
    for scraper in &selected {
        println!("  {}", scraper.name());
    }
    println!("Output directory: {}", config.output.base_directory.display());
    println!("Report format: {}", config.output.format.extension());
    println!("Cache: {}", if config.fetch.use_cache { "enabled" } else { "disabled" });
    println!("HTTP timeout: {} seconds", config.fetch.timeout);
    if let Some(dir) = &config.output.validation_dir {
        println!("Validation artifacts: {}", dir.display());
    }

    if cli.refresh {
        formatter.warning("Refresh enabled - cached responses would be ignored");
    }
    if cli.force {
        formatter.warning("Force mode enabled - today's report directory would be overwritten");
    }

    formatter.print_separator();
    formatter.success("Dry run completed successfully");
    0
}

fn print_startup_error(error: &ScrapeError) {
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}
