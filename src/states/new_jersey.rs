//! New Jersey publishes case and death totals through ArcGIS. Deaths by
//! race are only available as an underlying-data export of a Tableau
//! dashboard, which needs a session id from the dashboard page.
//!
//! Case counts by race are not published, so this scraper stays beta.

use crate::error::{Result, ScrapeError};
use crate::fetch::arcgis::Attributes;
use crate::fetch::{query_geoservice, GeoService};
use crate::reconcile::to_percentage;
use crate::record::Record;
use crate::scraper::{ScrapeContext, Scraper};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

pub const TOTALS_FLC_ID: &str = "24f4fcf164ad4b4280f08c8939dd5dc7";
pub const TOTALS_LAYER: &str = "CaseCounts06272020";

pub const RACE_MAIN_PAGE: &str = "https://public.tableau.com/views/UnderlyingCauses/COVID-19DeathsbyRace?%3Aembed=y&%3AshowVizHome=no&%3Adisplay_count=y&%3Adisplay_static_image=y&%3AbootstrapWhenNotified=true&%3Alanguage=en&:embed=y&:showVizHome=n&:apiID=host0";
pub const DEATHS_RACE_URL_TEMPLATE: &str = "https://public.tableau.com/vizql/w/UnderlyingCauses/v/COVID-19DeathsbyRace/vudcsv/sessions/{session_id}/views/7713620505763405234_13286885388891394922?underlying_table_id=Migrated%20Data&underlying_table_caption=Full%20Data";
const SESSION_HEADER: &str = "x-session-id";

static DIGITS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\d+").ok());

const RACE_COLUMN: &str = "Race/Ethnicity1";
const PERCENT_COLUMN: &str = "Percent (Race)";

pub struct NewJersey;

fn totals_service() -> GeoService {
    GeoService {
        flc_id: TOTALS_FLC_ID.to_string(),
        layer_name: TOTALS_LAYER.to_string(),
        out_fields: vec![
            "sum(TOTAL_CASES) as TOTAL_CASES".to_string(),
            "sum(TOTAL_DEATHS) as TOTAL_DEATHS".to_string(),
        ],
        ..GeoService::default()
    }
}

fn attribute(row: &Attributes, name: &str) -> Result<f64> {
    row.get(name)
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| ScrapeError::MissingColumn { column: name.to_string() })
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DeathsByRace {
    total: f64,
    black: f64,
    pct_black: f64,
}

fn parse_number(raw: &str) -> Result<f64> {
    Ok(raw.trim().replace(',', "").parse::<f64>()?)
}

/// Read the Tableau export: the second column's header carries the total
/// death count, its cells the per-race counts.
fn parse_deaths_by_race(csv_bytes: &[u8]) -> Result<DeathsByRace> {
    let csv_bytes = csv_bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(csv_bytes);
    let mut reader = csv::Reader::from_reader(csv_bytes);
    let headers = reader.headers()?.clone();

    let count_column = headers
        .get(1)
        .ok_or_else(|| ScrapeError::MissingColumn { column: "deaths count".to_string() })?;
    let Some(digits) = DIGITS.as_ref() else {
        return Err(ScrapeError::value("digit pattern failed to compile"));
    };
    let total = digits
        .find(count_column)
        .ok_or_else(|| ScrapeError::value(format!("no death total in column {:?}", count_column)))?
        .as_str()
        .parse::<f64>()?;

    let column_index = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ScrapeError::MissingColumn { column: name.to_string() })
    };
    let race_index = column_index(RACE_COLUMN)?;
    let percent_index = column_index(PERCENT_COLUMN)?;

    for record in reader.records() {
        let record = record?;
        let race = record.get(race_index).unwrap_or_default();
        if race.contains("Black") {
            let black = parse_number(record.get(1).unwrap_or_default())?;
            let fraction = parse_number(record.get(percent_index).unwrap_or_default())?;
            return Ok(DeathsByRace {
                total,
                black,
                pct_black: to_percentage(fraction, 1.0),
            });
        }
    }
    Err(ScrapeError::MissingRow { key: "Black".to_string() })
}

impl Scraper for NewJersey {
    fn name(&self) -> String {
        "New Jersey".to_string()
    }

    fn is_beta(&self) -> bool {
        true
    }

    fn scrape(&self, ctx: &ScrapeContext<'_>) -> Result<Vec<Record>> {
        let (date, totals) = query_geoservice(ctx.fetch(), &totals_service())?;
        info!("Processing data for {}", date);
        let first = totals
            .first()
            .ok_or_else(|| ScrapeError::MissingRow { key: "TOTAL_CASES".to_string() })?;
        let total_cases = attribute(first, "TOTAL_CASES")?;

        let session_id = ctx.fetch().fetch_header(RACE_MAIN_PAGE, SESSION_HEADER)?;
        info!("Tableau session ID is {}", session_id);

        let deaths_url = DEATHS_RACE_URL_TEMPLATE.replace("{session_id}", &session_id);
        let csv_bytes = ctx.fetch().fetch_bytes(&deaths_url, false)?;
        ctx.save_validation_artifact(&self.name(), "deaths_by_race.csv", &csv_bytes)?;
        let deaths = parse_deaths_by_race(&csv_bytes)?;
        debug!("Deaths by race: {:?}", deaths);

        let mut record = self.make_record();
        record.date = Some(date);
        record.cases = total_cases;
        record.deaths = deaths.total;
        record.aa_deaths = deaths.black;
        record.pct_aa_deaths = deaths.pct_black;
        record.pct_includes_unknown_race = false;
        record.pct_includes_hispanic_black = false;
        Ok(vec![record])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::arcgis::{build_query_url, ITEM_URL_TEMPLATE};
    use crate::fetch::StaticFetcher;
    use chrono::NaiveDate;

    const DEATHS_CSV: &str = "\
Race/Ethnicity1,Number of Deaths (N=13181),Percent (Race)
White,6512,0.494
Black,2443,0.1853
Hispanic,2548,0.1933
";

    #[test]
    fn test_parse_deaths_by_race() {
        let deaths = parse_deaths_by_race(DEATHS_CSV.as_bytes()).unwrap();
        assert_eq!(deaths.total, 13181.0);
        assert_eq!(deaths.black, 2443.0);
        assert_eq!(deaths.pct_black, 18.53);
    }

    #[test]
    fn test_black_row_matches_by_substring() {
        let csv = "\u{feff}Race/Ethnicity1,N (N=100),Percent (Race)\nNon-Hispanic Black,40,0.4\n";
        let deaths = parse_deaths_by_race(csv.as_bytes()).unwrap();
        assert_eq!(deaths.black, 40.0);
        assert_eq!(deaths.pct_black, 40.0);
    }

    #[test]
    fn test_death_total_taken_from_first_number_in_header() {
        assert!(DIGITS.is_some());
        let csv = "Race/Ethnicity1,Deaths 2020 (N=50),Percent (Race)\nBlack,10,0.2\n";
        let deaths = parse_deaths_by_race(csv.as_bytes()).unwrap();
        assert_eq!(deaths.total, 2020.0);
        assert_eq!(deaths.black, 10.0);
    }

    #[test]
    fn test_missing_percent_column() {
        let csv = "Race/Ethnicity1,N (N=100)\nBlack,40\n";
        let err = parse_deaths_by_race(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, ScrapeError::MissingColumn { ref column } if column == PERCENT_COLUMN));
    }

    #[test]
    fn test_scrape_end_to_end() {
        let service_url = "https://services7.arcgis.com/Z0rixLlManVefxqY/arcgis/rest/services/Cases/FeatureServer";
        let item_url = format!("{}?f=json", ITEM_URL_TEMPLATE.replace("{flc_id}", TOTALS_FLC_ID));
        let query_url = build_query_url(service_url, 0, &totals_service()).unwrap();

        let fetcher = StaticFetcher::new()
            .with_body(item_url, format!(r#"{{"url": "{}", "modified": 1593345600000}}"#, service_url))
            .with_body(
                format!("{}?f=json", service_url),
                format!(r#"{{"layers": [{{"id": 0, "name": "{}"}}]}}"#, TOTALS_LAYER),
            )
            .with_body(
                query_url.as_str(),
                r#"{"features": [{"attributes": {"TOTAL_CASES": 171182, "TOTAL_DEATHS": 13224}}]}"#,
            )
            .with_header(RACE_MAIN_PAGE, "X-Session-Id", "ABC123")
            .with_body(DEATHS_RACE_URL_TEMPLATE.replace("{session_id}", "ABC123"), DEATHS_CSV);

        let scraper = NewJersey;
        assert!(scraper.is_beta());
        let table = scraper.run(&ScrapeContext::new(&fetcher));
        let record = &table.rows()[0];
        assert!(record.is_success(), "{}", record.status);
        assert_eq!(record.location, "New Jersey");
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2020, 6, 28));
        assert_eq!(record.cases, 171182.0);
        assert_eq!(record.deaths, 13181.0);
        assert!(record.aa_cases.is_nan());
        assert!(record.pct_aa_cases.is_nan());
        assert_eq!(record.aa_deaths, 2443.0);
        assert_eq!(record.pct_aa_deaths, 18.53);
        assert!(!record.pct_includes_unknown_race);
        assert!(!record.pct_includes_hispanic_black);
    }

    #[test]
    fn test_missing_session_header_is_error_row() {
        let fetcher = StaticFetcher::new();
        let table = NewJersey.run(&ScrapeContext::new(&fetcher));
        assert_eq!(table.len(), 1);
        assert!(table.rows()[0].status.starts_with("ERROR: Io("));
    }
}
