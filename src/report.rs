use crate::config::ReportFormat;
use crate::error::{Result, ScrapeError};
use crate::pipeline::{combine, ScraperOutcome};
use crate::record::ResultTable;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const METADATA_DIR: &str = ".covid19_scrapers";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_time: DateTime<Utc>,
    pub report_date: NaiveDate,
    pub summary: RunSummary,
    pub scrapers: Vec<ScraperSummary>,
    pub config_used: ConfigSnapshot,
    pub results_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub scrapers_run: usize,
    pub rows: usize,
    pub successful_scrapers: usize,
    pub failed_scrapers: usize,
    pub duration: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperSummary {
    pub name: String,
    pub rows: usize,
    pub succeeded: bool,
    /// First error status, if the scraper produced one.
    pub error: Option<String>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub states: Vec<String>,
    pub include_beta: bool,
    pub refresh: bool,
    pub use_cache: bool,
    pub report_format: ReportFormat,
    pub validation_dir: Option<PathBuf>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.summary.failed_scrapers > 0
    }
}

impl From<&ScraperOutcome> for ScraperSummary {
    fn from(outcome: &ScraperOutcome) -> Self {
        Self {
            name: outcome.name.clone(),
            rows: outcome.table.len(),
            succeeded: outcome.succeeded(),
            error: outcome.first_error().map(str::to_string),
            elapsed: outcome.elapsed,
        }
    }
}

/// Owns the dated report directory and everything written into it.
pub struct ReportManager {
    base_path: PathBuf,
    output_directory: PathBuf,
    format: ReportFormat,
    force_overwrite: bool,
}

impl ReportManager {
    pub fn new(base_path: PathBuf, date: NaiveDate, format: ReportFormat) -> Result<Self> {
        let output_directory = base_path.join(report_directory_name(date));

        let manager = Self {
            base_path,
            output_directory,
            format,
            force_overwrite: false,
        };

        manager.validate_paths()?;
        Ok(manager)
    }

    pub fn with_force_overwrite(mut self, force: bool) -> Self {
        self.force_overwrite = force;
        self
    }

    pub fn initialize(&self) -> Result<()> {
        if self.output_directory.exists() {
            if !self.force_overwrite {
                return Err(ScrapeError::OutputDirectoryExists {
                    path: self.output_directory.display().to_string(),
                });
            }
            fs::remove_dir_all(&self.output_directory)?;
        }

        fs::create_dir_all(self.metadata_dir())?;
        Ok(())
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.output_directory.join(METADATA_DIR)
    }

    pub fn results_path(&self) -> PathBuf {
        self.output_directory
            .join(format!("report.{}", self.format.extension()))
    }

    /// Write the combined table and the run summaries.
    pub fn write_report(
        &self,
        outcomes: &[ScraperOutcome],
        duration: Duration,
        config: &ConfigSnapshot,
        report_date: NaiveDate,
    ) -> Result<RunReport> {
        let table = combine(outcomes);
        let results_file = self.write_results(&table)?;

        let scrapers: Vec<ScraperSummary> = outcomes.iter().map(ScraperSummary::from).collect();
        let failed = scrapers.iter().filter(|s| !s.succeeded).count();

        let report = RunReport {
            run_time: Utc::now(),
            report_date,
            summary: RunSummary {
                scrapers_run: scrapers.len(),
                rows: table.len(),
                successful_scrapers: scrapers.len() - failed,
                failed_scrapers: failed,
                duration,
            },
            scrapers,
            config_used: config.clone(),
            results_file,
        };

        self.save_report_json(&report)?;
        self.save_report_text(&report)?;
        self.create_summary_file(&report, &table)?;

        Ok(report)
    }

    fn write_results(&self, table: &ResultTable) -> Result<PathBuf> {
        let path = self.results_path();
        let file = fs::File::create(&path)?;
        match self.format {
            ReportFormat::Csv => table.write_csv(file)?,
            ReportFormat::Json => serde_json::to_writer_pretty(file, table.rows())?,
        }
        Ok(path)
    }

    fn save_report_json(&self, report: &RunReport) -> Result<()> {
        let report_path = self.metadata_dir().join("run_report.json");
        fs::write(report_path, serde_json::to_string_pretty(report)?)?;
        Ok(())
    }

    fn save_report_text(&self, report: &RunReport) -> Result<()> {
        let report_path = self.metadata_dir().join("run_report.txt");
        let mut file = fs::File::create(&report_path)?;

        writeln!(file, "COVID-19 Scrapers Run Report")?;
        writeln!(file, "============================")?;
        writeln!(file)?;
        writeln!(file, "Report date: {}", report.report_date)?;
        writeln!(file, "Run at: {}", report.run_time.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(file, "Duration: {:?}", report.summary.duration)?;
        writeln!(file, "Results: {}", report.results_file.display())?;
        writeln!(file)?;

        writeln!(file, "Summary:")?;
        writeln!(file, "  Scrapers run: {}", report.summary.scrapers_run)?;
        writeln!(file, "  Rows: {}", report.summary.rows)?;
        writeln!(file, "  Successful: {}", report.summary.successful_scrapers)?;
        writeln!(file, "  Failed: {}", report.summary.failed_scrapers)?;
        writeln!(file)?;

        writeln!(file, "Scrapers:")?;
        for scraper in &report.scrapers {
            let status = scraper.error.as_deref().unwrap_or("SUCCESS");
            writeln!(
                file,
                "  {} - {} row(s) in {:?} - {}",
                scraper.name, scraper.rows, scraper.elapsed, status
            )?;
        }
        writeln!(file)?;

        let config = &report.config_used;
        writeln!(file, "Configuration used:")?;
        if config.states.is_empty() {
            writeln!(file, "  States: all")?;
        } else {
            writeln!(file, "  States: {}", config.states.join(", "))?;
        }
        writeln!(file, "  Include beta: {}", config.include_beta)?;
        writeln!(file, "  Refresh: {}", config.refresh)?;
        writeln!(file, "  Use cache: {}", config.use_cache)?;
        writeln!(file, "  Report format: {}", config.report_format.extension())?;
        if let Some(ref dir) = config.validation_dir {
            writeln!(file, "  Validation directory: {}", dir.display())?;
        }

        Ok(())
    }

    fn create_summary_file(&self, report: &RunReport, table: &ResultTable) -> Result<()> {
        let summary_path = self.output_directory.join("SUMMARY.md");
        let mut file = fs::File::create(&summary_path)?;

        writeln!(file, "# COVID-19 Scrapers Summary")?;
        writeln!(file)?;
        writeln!(file, "**Report date:** {}", report.report_date)?;
        writeln!(file, "**Run at:** {}", report.run_time.format("%Y-%m-%d %H:%M UTC"))?;
        writeln!(
            file,
            "**Scrapers:** {} run, {} failed",
            report.summary.scrapers_run, report.summary.failed_scrapers
        )?;
        writeln!(file)?;

        writeln!(file, "## Results")?;
        writeln!(file)?;
        writeln!(
            file,
            "| Location | Date | Cases | Deaths | Black/AA cases | Black/AA deaths | % cases | % deaths | Status |"
        )?;
        writeln!(file, "|---|---|---|---|---|---|---|---|---|")?;
        for row in table.rows() {
            writeln!(
                file,
                "| {} | {} | {} | {} | {} | {} | {} | {} | {} |",
                markdown_cell(&row.location),
                row.date.map(|d| d.to_string()).unwrap_or_default(),
                format_value(row.cases),
                format_value(row.deaths),
                format_value(row.aa_cases),
                format_value(row.aa_deaths),
                format_value(row.pct_aa_cases),
                format_value(row.pct_aa_deaths),
                markdown_cell(&row.status),
            )?;
        }
        writeln!(file)?;

        let failures: Vec<_> = report.scrapers.iter().filter(|s| !s.succeeded).collect();
        if !failures.is_empty() {
            writeln!(file, "## Issues Encountered")?;
            writeln!(file)?;
            for scraper in failures {
                writeln!(
                    file,
                    "- **{}**: {}",
                    scraper.name,
                    markdown_cell(scraper.error.as_deref().unwrap_or("unknown error"))
                )?;
            }
            writeln!(file)?;
        }

        writeln!(file, "---")?;
        writeln!(file, "*Generated by covid19-scrapers*")?;

        Ok(())
    }

    fn validate_paths(&self) -> Result<()> {
        if !self.base_path.exists() {
            fs::create_dir_all(&self.base_path).map_err(|e| ScrapeError::Permission {
                path: format!("Cannot create base directory {}: {}", self.base_path.display(), e),
            })?;
        }

        let test_file = self.base_path.join(".covid19_scrapers_write_test");
        match fs::File::create(&test_file) {
            Ok(_) => {
                let _ = fs::remove_file(&test_file);
            }
            Err(e) => {
                return Err(ScrapeError::Permission {
                    path: format!("No write permission for directory {}: {}", self.base_path.display(), e),
                });
            }
        }

        Ok(())
    }
}

pub fn report_directory_name(date: NaiveDate) -> String {
    format!("report_{}", date.format("%Y-%m-%d"))
}

/// Keep a table cell on one line and its pipes literal.
fn markdown_cell(text: &str) -> String {
    text.replace(['\r', '\n'], " ").replace('|', "\\|")
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "n/a".to_string()
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 6, 30).unwrap()
    }

    fn snapshot(format: ReportFormat) -> ConfigSnapshot {
        ConfigSnapshot {
            states: vec![],
            include_beta: false,
            refresh: false,
            use_cache: true,
            report_format: format,
            validation_dir: None,
        }
    }

    fn outcomes() -> Vec<ScraperOutcome> {
        let mut ok = Record::new("Georgia");
        ok.date = Some(date());
        ok.cases = 1000.0;
        ok.pct_aa_cases = 55.56;
        let failed = Record::new("Florida").with_status("ERROR: Value('Unable to find link')");
        vec![
            ScraperOutcome {
                name: "Georgia".to_string(),
                table: ResultTable::from(vec![ok]),
                elapsed: Duration::from_millis(20),
            },
            ScraperOutcome {
                name: "Florida".to_string(),
                table: ResultTable::from(vec![failed]),
                elapsed: Duration::from_millis(5),
            },
        ]
    }

    #[test]
    fn test_report_directory_is_dated() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ReportManager::new(temp_dir.path().to_path_buf(), date(), ReportFormat::Csv).unwrap();
        assert_eq!(manager.output_directory(), temp_dir.path().join("report_2020-06-30"));
        assert_eq!(manager.results_path(), temp_dir.path().join("report_2020-06-30/report.csv"));
    }

    #[test]
    fn test_write_csv_report() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ReportManager::new(temp_dir.path().to_path_buf(), date(), ReportFormat::Csv).unwrap();
        manager.initialize().unwrap();

        let report = manager
            .write_report(&outcomes(), Duration::from_millis(30), &snapshot(ReportFormat::Csv), date())
            .unwrap();

        assert_eq!(report.summary.rows, 2);
        assert_eq!(report.summary.failed_scrapers, 1);
        assert!(report.has_failures());

        let csv = fs::read_to_string(manager.results_path()).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("Location,Date Published,Total Cases"));
        assert!(lines.next().unwrap().starts_with("Georgia,2020-06-30,1000"));

        assert!(manager.metadata_dir().join("run_report.json").exists());
        let text = fs::read_to_string(manager.metadata_dir().join("run_report.txt")).unwrap();
        assert!(text.contains("Failed: 1"));
        let summary = fs::read_to_string(manager.output_directory().join("SUMMARY.md")).unwrap();
        assert!(summary.contains("| Georgia | 2020-06-30 | 1000 | n/a |"));
        assert!(summary.contains("- **Florida**: ERROR: Value('Unable to find link')"));
    }

    #[test]
    fn test_write_json_report() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ReportManager::new(temp_dir.path().to_path_buf(), date(), ReportFormat::Json).unwrap();
        manager.initialize().unwrap();
        manager
            .write_report(&outcomes(), Duration::ZERO, &snapshot(ReportFormat::Json), date())
            .unwrap();

        let rows: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(manager.results_path()).unwrap()).unwrap();
        assert_eq!(rows[0]["Location"], "Georgia");
        assert_eq!(rows[0]["Pct Cases Black/AA"], 55.56);
        assert!(rows[0]["Total Deaths"].is_null());
        assert_eq!(rows[1]["Status code"], "ERROR: Value('Unable to find link')");
    }

    #[test]
    fn test_force_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ReportManager::new(temp_dir.path().to_path_buf(), date(), ReportFormat::Csv).unwrap();

        manager.initialize().unwrap();
        fs::write(manager.output_directory().join("stale.txt"), "old").unwrap();

        assert!(matches!(
            manager.initialize(),
            Err(ScrapeError::OutputDirectoryExists { .. })
        ));

        let manager = manager.with_force_overwrite(true);
        manager.initialize().unwrap();
        assert!(!manager.output_directory().join("stale.txt").exists());
    }

    #[test]
    fn test_summary_escapes_table_cells() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ReportManager::new(temp_dir.path().to_path_buf(), date(), ReportFormat::Csv).unwrap();
        manager.initialize().unwrap();

        let row = Record::new("New|Jersey").with_status("ERROR: Value('a | b\nc')");
        let outcome = ScraperOutcome {
            name: "New Jersey".to_string(),
            table: ResultTable::from(vec![row]),
            elapsed: Duration::ZERO,
        };
        manager
            .write_report(&[outcome], Duration::ZERO, &snapshot(ReportFormat::Csv), date())
            .unwrap();

        let summary = fs::read_to_string(manager.output_directory().join("SUMMARY.md")).unwrap();
        let line = summary.lines().find(|l| l.starts_with("| New")).unwrap();
        assert!(line.starts_with("| New\\|Jersey |"));
        assert!(line.ends_with("| ERROR: Value('a \\| b c') |"));
        assert_eq!(line.matches(" | ").count(), 8);
        assert!(summary.contains("- **New Jersey**: ERROR: Value('a \\| b c')"));
    }

    #[test]
    fn test_markdown_cell() {
        assert_eq!(markdown_cell("plain"), "plain");
        assert_eq!(markdown_cell("a|b\r\nc"), "a\\|b  c");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(f64::NAN), "n/a");
        assert_eq!(format_value(1234.0), "1234");
        assert_eq!(format_value(22.222), "22.22");
    }
}
