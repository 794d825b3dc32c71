//! Per-state extractors and the registry used to select them.

pub mod florida;
pub mod georgia;
pub mod new_jersey;

pub use florida::Florida;
pub use georgia::Georgia;
pub use new_jersey::NewJersey;

use crate::error::{Result, ScrapeError};
use crate::scraper::Scraper;
use tracing::debug;

/// Every known scraper, in report order.
pub fn all_scrapers() -> Vec<Box<dyn Scraper>> {
    vec![Box::new(Florida), Box::new(Georgia), Box::new(NewJersey)]
}

/// Lowercase alphanumerics only, so `"New Jersey"`, `new_jersey` and
/// `NewJersey` all match.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Resolve the scrapers to run.
///
/// With no names, every stable scraper is selected, plus the beta ones when
/// `include_beta` is set. Named scrapers are always selected, beta or not.
pub fn select_scrapers(requested: &[String], include_beta: bool) -> Result<Vec<Box<dyn Scraper>>> {
    let selected: Vec<Box<dyn Scraper>> = if requested.is_empty() {
        all_scrapers()
            .into_iter()
            .filter(|s| include_beta || !s.is_beta())
            .collect()
    } else {
        let wanted = requested
            .iter()
            .map(|name| {
                let key = normalize_name(name);
                if all_scrapers().iter().any(|s| normalize_name(&s.name()) == key) {
                    Ok(key)
                } else {
                    Err(ScrapeError::UnknownState { name: name.clone() })
                }
            })
            .collect::<Result<Vec<_>>>()?;

        all_scrapers()
            .into_iter()
            .filter(|s| wanted.contains(&normalize_name(&s.name())))
            .collect()
    };

    if selected.is_empty() {
        return Err(ScrapeError::NoScrapersSelected {
            requested: requested.to_vec(),
        });
    }
    debug!(
        "Selected scrapers: {}",
        selected.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
    );
    Ok(selected)
}
