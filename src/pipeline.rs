//! Batch driver: runs each selected scraper through the harness and keeps
//! per-scraper timing.

use crate::error::Result;
use crate::record::ResultTable;
use crate::scraper::{ScrapeContext, Scraper};
use crate::ui::GracefulShutdown;
use std::time::{Duration, Instant};
use tracing::info;

/// Result of running one scraper.
#[derive(Debug, Clone)]
pub struct ScraperOutcome {
    pub name: String,
    pub table: ResultTable,
    pub elapsed: Duration,
}

impl ScraperOutcome {
    pub fn succeeded(&self) -> bool {
        self.table.failures().next().is_none()
    }

    /// Status of the first failing row, if any.
    pub fn first_error(&self) -> Option<&str> {
        self.table.failures().next().map(|r| r.status.as_str())
    }
}

fn run_one(scraper: &dyn Scraper, ctx: &ScrapeContext<'_>) -> ScraperOutcome {
    let name = scraper.name();
    info!("Running {}", name);
    let start = Instant::now();
    let table = scraper.run(ctx);
    let elapsed = start.elapsed();
    info!("{} produced {} row(s) in {:?}", name, table.len(), elapsed);
    ScraperOutcome { name, table, elapsed }
}

/// Run `scrapers` in order, calling `on_done` after each one. Stops with
/// [`crate::ScrapeError::Cancelled`] once shutdown has been requested.
#[cfg(not(feature = "parallel"))]
pub fn run_batch<F>(
    scrapers: &[Box<dyn Scraper>],
    ctx: &ScrapeContext<'_>,
    shutdown: &GracefulShutdown,
    on_done: F,
) -> Result<Vec<ScraperOutcome>>
where
    F: Fn(&ScraperOutcome) + Sync,
{
    let mut outcomes = Vec::with_capacity(scrapers.len());
    for scraper in scrapers {
        shutdown.check_shutdown()?;
        let outcome = run_one(scraper.as_ref(), ctx);
        on_done(&outcome);
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

/// Run `scrapers` on the rayon pool, calling `on_done` as each one
/// finishes. Outcomes keep the input order. Scrapers not yet started when
/// shutdown is requested are skipped and the batch reports cancellation.
#[cfg(feature = "parallel")]
pub fn run_batch<F>(
    scrapers: &[Box<dyn Scraper>],
    ctx: &ScrapeContext<'_>,
    shutdown: &GracefulShutdown,
    on_done: F,
) -> Result<Vec<ScraperOutcome>>
where
    F: Fn(&ScraperOutcome) + Sync,
{
    use rayon::prelude::*;

    let outcomes: Vec<Option<ScraperOutcome>> = scrapers
        .par_iter()
        .map(|scraper| {
            if !shutdown.is_running() {
                return None;
            }
            let outcome = run_one(scraper.as_ref(), ctx);
            on_done(&outcome);
            Some(outcome)
        })
        .collect();

    shutdown.check_shutdown()?;
    Ok(outcomes.into_iter().flatten().collect())
}

/// Concatenate all outcome tables in batch order.
pub fn combine(outcomes: &[ScraperOutcome]) -> ResultTable {
    let mut table = ResultTable::new();
    for outcome in outcomes {
        table.append(outcome.table.clone());
    }
    table
}
