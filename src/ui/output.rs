use crate::error::{ScrapeError, UserFriendlyError};
use crate::pipeline::ScraperOutcome;
use crate::report::RunReport;
use crate::scraper::Scraper;
use crate::ui::progress::format_duration;
use console::{style, Emoji, Term};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
    Plain,
}

static CHECKMARK: Emoji = Emoji("✅ ", "✓ ");
static CROSS: Emoji = Emoji("❌ ", "✗ ");
static INFO: Emoji = Emoji("ℹ️  ", "i ");
static WARNING: Emoji = Emoji("⚠️  ", "! ");
static ROCKET: Emoji = Emoji("🚀 ", "> ");
static SPARKLES: Emoji = Emoji("✨ ", "* ");

pub struct OutputFormatter {
    mode: OutputMode,
    use_colors: bool,
    verbose_level: u8,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let use_colors = match mode {
            OutputMode::Human => Term::stdout().features().colors_supported() && !quiet,
            _ => false,
        };

        Self {
            mode,
            use_colors,
            verbose_level: if quiet { 0 } else { verbose },
            quiet,
        }
    }

    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Success, message),
            OutputMode::Json => self.print_json_message("success", message),
            OutputMode::Plain => println!("SUCCESS: {}", message),
        }
    }

    fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Error, message),
            OutputMode::Json => self.print_json_message("error", message),
            OutputMode::Plain => eprintln!("ERROR: {}", message),
        }
    }

    pub fn warning(&self, message: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Warning, message),
                OutputMode::Json => self.print_json_message("warning", message),
                OutputMode::Plain => println!("WARNING: {}", message),
            }
        }
    }

    pub fn info(&self, message: &str) {
        if self.should_show_message(1) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Info, message),
                OutputMode::Json => self.print_json_message("info", message),
                OutputMode::Plain => println!("INFO: {}", message),
            }
        }
    }

    pub fn start_operation(&self, operation: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("{}{}", ROCKET, style(operation).bold());
                    } else {
                        println!("> {}", operation);
                    }
                }
                OutputMode::Json => self.print_json_message("operation_start", operation),
                OutputMode::Plain => println!("STARTING: {}", operation),
            }
        }
    }

    pub fn print_user_friendly_error(&self, error: &ScrapeError) {
        self.error(&error.user_message());

        if let Some(suggestion) = error.suggestion() {
            match self.mode {
                OutputMode::Human => {
                    eprintln!();
                    if self.use_colors {
                        eprintln!("{}{}", INFO, style(format!("Suggestion: {}", suggestion)).cyan());
                    } else {
                        eprintln!("Suggestion: {}", suggestion);
                    }
                }
                OutputMode::Json => {
                    self.print_json_object(&serde_json::json!({
                        "type": "suggestion",
                        "message": suggestion
                    }));
                }
                OutputMode::Plain => eprintln!("SUGGESTION: {}", suggestion),
            }
        }
    }

    /// Registered scrapers, one per line, beta ones marked.
    pub fn print_scraper_list(&self, scrapers: &[Box<dyn Scraper>]) {
        match self.mode {
            OutputMode::Json => {
                let list: Vec<_> = scrapers
                    .iter()
                    .map(|s| serde_json::json!({ "name": s.name(), "beta": s.is_beta() }))
                    .collect();
                self.print_json_object(&serde_json::json!({ "type": "scrapers", "scrapers": list }));
            }
            _ => {
                for scraper in scrapers {
                    if scraper.is_beta() {
                        println!("{} (beta)", scraper.name());
                    } else {
                        println!("{}", scraper.name());
                    }
                }
            }
        }
    }

    /// Per-scraper result lines printed as the batch finishes.
    pub fn print_run_summary(&self, outcomes: &[ScraperOutcome]) {
        if self.quiet || self.mode == OutputMode::Json {
            return;
        }

        println!();
        self.print_separator();
        for outcome in outcomes {
            let elapsed = format_duration(outcome.elapsed);
            match (self.mode, outcome.first_error()) {
                (OutputMode::Human, None) if self.use_colors => println!(
                    "{}{} {}",
                    CHECKMARK,
                    style(&outcome.name).green().bold(),
                    style(format!("{} row(s), {}", outcome.table.len(), elapsed)).dim()
                ),
                (OutputMode::Human, Some(error)) if self.use_colors => println!(
                    "{}{} {}",
                    CROSS,
                    style(&outcome.name).red().bold(),
                    style(error).red()
                ),
                (_, None) => println!("OK {} - {} row(s), {}", outcome.name, outcome.table.len(), elapsed),
                (_, Some(error)) => println!("FAILED {} - {}", outcome.name, error),
            }
        }
        self.print_separator();
    }

    pub fn print_run_report(&self, report: &RunReport) {
        match self.mode {
            OutputMode::Human => self.print_human_report(report),
            OutputMode::Json => {
                let json_output = serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
                println!("{}", json_output);
            }
            OutputMode::Plain => self.print_plain_report(report),
        }
    }

    pub fn print_separator(&self) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human if self.use_colors => println!("{}", style("─".repeat(60)).dim()),
            OutputMode::Human | OutputMode::Plain => println!("{}", "-".repeat(60)),
            OutputMode::Json => {}
        }
    }

    fn should_show_message(&self, min_verbose_level: u8) -> bool {
        !self.quiet && self.verbose_level >= min_verbose_level
    }

    fn print_human_message(&self, msg_type: MessageType, message: &str) {
        if self.use_colors {
            let (emoji, styled) = match msg_type {
                MessageType::Success => (CHECKMARK, style(message).green().bold()),
                MessageType::Error => (CROSS, style(message).red().bold()),
                MessageType::Warning => (WARNING, style(message).yellow().bold()),
                MessageType::Info => (INFO, style(message).cyan()),
            };
            match msg_type {
                MessageType::Error => eprintln!("{}{}", emoji, styled),
                _ => println!("{}{}", emoji, styled),
            }
        } else {
            let prefix = match msg_type {
                MessageType::Success => "✓",
                MessageType::Error => "✗",
                MessageType::Warning => "!",
                MessageType::Info => "i",
            };
            match msg_type {
                MessageType::Error => eprintln!("{} {}", prefix, message),
                _ => println!("{} {}", prefix, message),
            }
        }
    }

    fn print_json_message(&self, level: &str, message: &str) {
        self.print_json_object(&serde_json::json!({
            "type": "message",
            "level": level,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));
    }

    fn print_json_object(&self, obj: &serde_json::Value) {
        println!("{}", serde_json::to_string(obj).unwrap_or_else(|_| "{}".to_string()));
    }

    fn print_human_report(&self, report: &RunReport) {
        println!();
        if self.use_colors {
            println!("{} {}", SPARKLES, style("Run Report").bold().cyan());
        } else {
            println!("=== Run Report ===");
        }
        println!();

        println!("Report date: {}", report.report_date);
        println!("Results:     {}", report.results_file.display());
        println!(
            "Scrapers:    {} run, {} failed",
            report.summary.scrapers_run, report.summary.failed_scrapers
        );
        println!("Rows:        {}", report.summary.rows);
        println!("Time taken:  {}", format_duration(report.summary.duration));

        if report.has_failures() {
            println!();
            println!("Issues encountered:");
            for scraper in report.scrapers.iter().filter(|s| !s.succeeded) {
                println!("  - {}: {}", scraper.name, scraper.error.as_deref().unwrap_or("unknown error"));
            }
        }
    }

    fn print_plain_report(&self, report: &RunReport) {
        println!("REPORT: Run completed");
        println!("Date: {}", report.report_date);
        println!("Results: {}", report.results_file.display());
        println!("Scrapers: {}", report.summary.scrapers_run);
        println!("Rows: {}", report.summary.rows);
        println!("Duration: {:?}", report.summary.duration);
        if report.has_failures() {
            println!("Failed: {}", report.summary.failed_scrapers);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum MessageType {
    Success,
    Error,
    Warning,
    Info,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_mode() {
        let formatter = OutputFormatter::new(OutputMode::Human, 2, true);
        assert_eq!(formatter.verbose_level, 0);
        assert!(!formatter.should_show_message(0));
    }

    #[test]
    fn test_should_show_message() {
        let formatter = OutputFormatter::new(OutputMode::Plain, 1, false);
        assert!(formatter.should_show_message(0));
        assert!(formatter.should_show_message(1));
        assert!(!formatter.should_show_message(2));
        assert!(!formatter.use_colors);
    }
}
