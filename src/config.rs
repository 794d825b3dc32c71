use crate::error::{Result, ScrapeError};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["covid19_scrapers.toml", ".covid19_scrapers.toml"];

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub scrapers: ScrapersConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout in seconds.
    pub timeout: u64,
    pub use_cache: bool,
    pub cache_dir: PathBuf,
    pub user_agent: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ScrapersConfig {
    /// Scrapers to run; empty means all stable ones.
    pub states: Vec<String>,
    pub include_beta: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub base_directory: PathBuf,
    pub format: ReportFormat,
    pub validation_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// One CSV row per record
    #[default]
    Csv,
    /// JSON array of records
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Csv => "csv",
            ReportFormat::Json => "json",
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: 60,
            use_cache: true,
            cache_dir: PathBuf::from(".covid19_scrapers_cache"),
            user_agent: format!("covid19-scrapers/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            format: ReportFormat::Csv,
            validation_dir: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScrapeError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ScrapeError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ScrapeError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                for default_path in &DEFAULT_CONFIG_PATHS {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }
                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref states) = cli_args.states {
            self.scrapers.states = states.clone();
        }

        if let Some(include_beta) = cli_args.include_beta {
            self.scrapers.include_beta = include_beta;
        }

        if let Some(ref output_dir) = cli_args.output_dir {
            self.output.base_directory = output_dir.clone();
        }

        if let Some(format) = cli_args.report_format {
            self.output.format = format;
        }

        if let Some(ref validation_dir) = cli_args.validation_dir {
            self.output.validation_dir = Some(validation_dir.clone());
        }

        if let Some(timeout) = cli_args.timeout {
            self.fetch.timeout = timeout;
        }

        if let Some(use_cache) = cli_args.use_cache {
            self.fetch.use_cache = use_cache;
        }

        if let Some(ref cache_dir) = cli_args.cache_dir {
            self.fetch.cache_dir = cache_dir.clone();
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| ScrapeError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        std::fs::write(path, content).map_err(|e| ScrapeError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.timeout == 0 {
            return Err(ScrapeError::Config {
                message: "Fetch timeout must be greater than 0".to_string(),
            });
        }

        if self.fetch.user_agent.trim().is_empty() {
            return Err(ScrapeError::Config {
                message: "User agent must not be empty".to_string(),
            });
        }

        if self.fetch.use_cache && self.fetch.cache_dir.as_os_str().is_empty() {
            return Err(ScrapeError::Config {
                message: "A cache directory is required when caching is enabled".to_string(),
            });
        }

        if self.scrapers.states.iter().any(|s| s.trim().is_empty()) {
            return Err(ScrapeError::Config {
                message: "State names must not be empty".to_string(),
            });
        }

        if let Some(parent) = self.output.base_directory.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ScrapeError::Config {
                    message: format!("Parent directory does not exist: {}", parent.display()),
                });
            }
        }

        Ok(())
    }

    pub fn fetch_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout)
    }

    pub fn create_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub states: Option<Vec<String>>,
    pub include_beta: Option<bool>,
    pub output_dir: Option<PathBuf>,
    pub report_format: Option<ReportFormat>,
    pub validation_dir: Option<PathBuf>,
    pub timeout: Option<u64>,
    pub use_cache: Option<bool>,
    pub cache_dir: Option<PathBuf>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_states(mut self, states: Option<Vec<String>>) -> Self {
        self.states = states;
        self
    }

    pub fn with_include_beta(mut self, include_beta: Option<bool>) -> Self {
        self.include_beta = include_beta;
        self
    }

    pub fn with_output_dir(mut self, output_dir: Option<PathBuf>) -> Self {
        self.output_dir = output_dir;
        self
    }

    pub fn with_report_format(mut self, format: Option<ReportFormat>) -> Self {
        self.report_format = format;
        self
    }

    pub fn with_validation_dir(mut self, validation_dir: Option<PathBuf>) -> Self {
        self.validation_dir = validation_dir;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<u64>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_use_cache(mut self, use_cache: Option<bool>) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: Option<PathBuf>) -> Self {
        self.cache_dir = cache_dir;
        self
    }
}
