//! Georgia publishes a zip file of COVID-19 CSV files, updated daily.

use crate::error::{Result, ScrapeError};
use crate::fetch::get_zip;
use crate::reconcile::to_percentage;
use crate::record::Record;
use crate::scraper::{ScrapeContext, Scraper};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const ZIP_URL: &str = "https://ga-covid19.ondemand.sas.com/docs/ga_covid_data.zip";
const DEMOGRAPHICS_MEMBER: &str = "demographics.csv";
const AA_PREFIX: &str = "African-American";

pub struct Georgia;

#[derive(Debug, Deserialize)]
struct DemographicsRow {
    race: String,
    #[serde(rename = "Confirmed_Cases")]
    confirmed_cases: Option<f64>,
    #[serde(rename = "Deaths")]
    deaths: Option<f64>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Counts {
    cases: f64,
    deaths: f64,
}

/// Case and death sums per race; blank cells count as zero.
fn sum_by_race(csv_bytes: &[u8]) -> Result<BTreeMap<String, Counts>> {
    let mut reader = csv::Reader::from_reader(csv_bytes);
    let mut by_race: BTreeMap<String, Counts> = BTreeMap::new();
    for row in reader.deserialize() {
        let row: DemographicsRow = row?;
        let entry = by_race.entry(row.race).or_default();
        entry.cases += row.confirmed_cases.unwrap_or(0.0);
        entry.deaths += row.deaths.unwrap_or(0.0);
    }
    Ok(by_race)
}

impl Scraper for Georgia {
    fn scrape(&self, ctx: &ScrapeContext<'_>) -> Result<Vec<Record>> {
        debug!("Download covid data zip file");
        let mut zip = get_zip(ctx.fetch(), ZIP_URL, ctx.use_cache())?;
        ctx.save_validation_artifact(&self.name(), "ga_covid_data.zip", zip.raw())?;

        debug!("Get the last update of the demographics.csv file in archive");
        let date = zip.member_last_modified(DEMOGRAPHICS_MEMBER)?;
        info!("Processing data for {}", date);

        debug!("Load demographics CSV");
        let by_race = sum_by_race(&zip.member_bytes(DEMOGRAPHICS_MEMBER)?)?;
        let total_cases: f64 = by_race.values().map(|c| c.cases).sum();
        let total_deaths: f64 = by_race.values().map(|c| c.deaths).sum();

        debug!("African American cases and deaths");
        let aa = by_race
            .iter()
            .find(|(race, _)| race.starts_with(AA_PREFIX))
            .map(|(_, counts)| *counts)
            .ok_or_else(|| ScrapeError::MissingRow { key: AA_PREFIX.to_string() })?;

        let mut record = self.make_record();
        record.date = Some(date);
        record.cases = total_cases;
        record.deaths = total_deaths;
        record.aa_cases = aa.cases;
        record.aa_deaths = aa.deaths;
        record.pct_aa_cases = to_percentage(aa.cases, total_cases);
        record.pct_aa_deaths = to_percentage(aa.deaths, total_deaths);
        record.pct_includes_unknown_race = true;
        record.pct_includes_hispanic_black = true;
        Ok(vec![record])
    }
}
