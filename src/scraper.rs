use crate::error::{Result, ScrapeError};
use crate::fetch::Fetch;
use crate::record::{Record, ResultTable};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Everything a scraper needs from its caller for one run.
pub struct ScrapeContext<'a> {
    fetch: &'a dyn Fetch,
    refresh: bool,
    validation_dir: Option<PathBuf>,
}

impl<'a> ScrapeContext<'a> {
    pub fn new(fetch: &'a dyn Fetch) -> Self {
        Self {
            fetch,
            refresh: false,
            validation_dir: None,
        }
    }

    /// Bypass cached downloads when `refresh` is set.
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_validation_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.validation_dir = dir;
        self
    }

    pub fn fetch(&self) -> &dyn Fetch {
        self.fetch
    }

    pub fn use_cache(&self) -> bool {
        !self.refresh
    }

    /// Keep a copy of raw source bytes for manual validation. No-op when no
    /// validation directory is configured.
    pub fn save_validation_artifact(&self, scraper: &str, name: &str, bytes: &[u8]) -> Result<()> {
        let Some(dir) = self.validation_dir.as_deref() else {
            return Ok(());
        };
        std::fs::create_dir_all(dir)?;
        let file_name = format!("{}_{}", scraper.replace(' ', "_").to_lowercase(), name);
        let path = dir.join(file_name);
        debug!("Saving validation artifact {}", path.display());
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// A per-state extractor.
///
/// Implementors provide [`Scraper::scrape`]; [`Scraper::run`] wraps it so that
/// every failure, including a panic, comes back as a status-bearing row.
pub trait Scraper: Send + Sync {
    /// Display name. Defaults to the implementing type's name.
    fn name(&self) -> String {
        short_type_name(std::any::type_name::<Self>()).to_string()
    }

    /// Beta scrapers are only run when explicitly requested.
    fn is_beta(&self) -> bool {
        false
    }

    fn scrape(&self, ctx: &ScrapeContext<'_>) -> Result<Vec<Record>>;

    /// A fresh row for this scraper with default values.
    fn make_record(&self) -> Record {
        Record::new(self.name())
    }

    fn format_error(&self, error: &ScrapeError) -> String {
        format!("ERROR: {}('{}')", error.class_name(), error)
    }

    fn handle_error(&self, error: &ScrapeError) -> Vec<Record> {
        vec![self.make_record().with_status(self.format_error(error))]
    }

    fn run(&self, ctx: &ScrapeContext<'_>) -> ResultTable {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.scrape(ctx)))
            .unwrap_or_else(|payload| Err(ScrapeError::Panic(panic_message(payload.as_ref()))));

        match outcome {
            Ok(records) => ResultTable::from(records),
            Err(error) => {
                warn!("{} failed: {}", self.name(), error);
                ResultTable::from(self.handle_error(&error))
            }
        }
    }
}

fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "scraper panicked".to_string()
    }
}
