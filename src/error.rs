use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("PDF parse error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("anchor word {word:?} not found on page {page}")]
    MissingAnchor { word: String, page: usize },

    #[error("column {column:?} not found")]
    MissingColumn { column: String },

    #[error("row {key:?} not found")]
    MissingRow { key: String },

    #[error("response from {url} has no {header:?} header")]
    MissingHeader { url: String, header: String },

    #[error("{0}")]
    Value(String),

    #[error("{0}")]
    Panic(String),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unknown state scraper: {name}")]
    UnknownState { name: String },

    #[error("No scrapers selected")]
    NoScrapersSelected { requested: Vec<String> },

    #[error("Permission denied: {path}")]
    Permission { path: String },

    #[error("Operation was cancelled by user")]
    Cancelled,

    #[error("Output directory already exists: {path}")]
    OutputDirectoryExists { path: String },
}

impl ScrapeError {
    /// Short name of the error kind, used in status strings.
    pub fn class_name(&self) -> &'static str {
        match self {
            ScrapeError::Http(_) => "Http",
            ScrapeError::Io(_) => "Io",
            ScrapeError::Zip(_) => "Zip",
            ScrapeError::Csv(_) => "Csv",
            ScrapeError::Pdf(_) => "Pdf",
            ScrapeError::Json(_) => "Json",
            ScrapeError::InvalidUrl { .. } => "InvalidUrl",
            ScrapeError::MissingAnchor { .. } => "MissingAnchor",
            ScrapeError::MissingColumn { .. } => "MissingColumn",
            ScrapeError::MissingRow { .. } => "MissingRow",
            ScrapeError::MissingHeader { .. } => "MissingHeader",
            ScrapeError::Value(_) => "Value",
            ScrapeError::Panic(_) => "Panic",
            ScrapeError::Config { .. } => "Config",
            ScrapeError::UnknownState { .. } => "UnknownState",
            ScrapeError::NoScrapersSelected { .. } => "NoScrapersSelected",
            ScrapeError::Permission { .. } => "Permission",
            ScrapeError::Cancelled => "Cancelled",
            ScrapeError::OutputDirectoryExists { .. } => "OutputDirectoryExists",
        }
    }

    pub fn value<S: Into<String>>(message: S) -> Self {
        ScrapeError::Value(message.into())
    }
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for ScrapeError {
    fn user_message(&self) -> String {
        match self {
            ScrapeError::Http(e) => match e.url() {
                Some(url) => format!("Request to {} failed: {}", url, e),
                None => format!("HTTP request failed: {}", e),
            },
            ScrapeError::Config { message } => {
                format!("Configuration error: {}", message)
            }
            ScrapeError::UnknownState { name } => {
                format!("No scraper is registered for '{}'", name)
            }
            ScrapeError::NoScrapersSelected { requested } => {
                if requested.is_empty() {
                    "No scrapers selected to run".to_string()
                } else {
                    format!("None of the requested scrapers can run: {}", requested.join(", "))
                }
            }
            ScrapeError::Permission { path } => {
                format!("Permission denied accessing: {}", path)
            }
            ScrapeError::Cancelled => "Operation was cancelled by user".to_string(),
            ScrapeError::OutputDirectoryExists { path } => {
                format!("Output directory already exists: {}", path)
            }
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            ScrapeError::Http(_) => Some(
                "Check your internet connection. Upstream dashboards move often; retry with --refresh once the source is reachable.".to_string()
            ),
            ScrapeError::Config { .. } => Some(
                "Check your configuration file syntax and ensure all required fields are present.".to_string()
            ),
            ScrapeError::UnknownState { .. } => Some(
                "Run with --list to see the available scrapers.".to_string()
            ),
            ScrapeError::NoScrapersSelected { .. } => Some(
                "Pass state names as arguments, or add --include-beta to run beta scrapers.".to_string()
            ),
            ScrapeError::Permission { .. } => Some(
                "Ensure you have the necessary read/write permissions for the target directory.".to_string()
            ),
            ScrapeError::OutputDirectoryExists { .. } => Some(
                "Remove the existing report, choose another base directory with --output, or use --force to overwrite.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<url::ParseError> for ScrapeError {
    fn from(error: url::ParseError) -> Self {
        ScrapeError::InvalidUrl {
            url: error.to_string(),
        }
    }
}

impl From<toml::de::Error> for ScrapeError {
    fn from(error: toml::de::Error) -> Self {
        ScrapeError::Config {
            message: error.to_string(),
        }
    }
}

impl From<chrono::ParseError> for ScrapeError {
    fn from(error: chrono::ParseError) -> Self {
        ScrapeError::Value(format!("invalid date: {}", error))
    }
}

impl From<std::num::ParseFloatError> for ScrapeError {
    fn from(error: std::num::ParseFloatError) -> Self {
        ScrapeError::Value(format!("could not convert string to float: {}", error))
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
