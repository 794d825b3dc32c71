//! Florida publishes a daily PDF report; the race/ethnicity table sits on
//! page 3.

use crate::error::{Result, ScrapeError};
use crate::fetch::{find_link_by_title, url_to_soup};
use crate::pdf::{locate_table_region, read_table, Column, PdfDocument, Rect, WordBox};
use crate::reconcile::{reconcile, DemographicTable, ReconcileKeys, Reconciled, ALL_ETHNICITIES};
use crate::record::Record;
use crate::scraper::{ScrapeContext, Scraper};
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

pub const COVID_PAGE_URL: &str = "https://floridadisaster.org/covid19/";
pub const DAILY_REPORT_TITLE: &str = "COVID-19 Data - Daily Report Archive";

/// Zero-based index of the page holding the race/ethnicity table.
const TABLE_PAGE_INDEX: usize = 2;
const TOP_ANCHOR: &str = "White";
const BOTTOM_ANCHOR: &str = "Total";
static REPORT_DATE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"-(\d{4}-\d{2}-\d{2})-").ok());

const RACES: [&str; 5] = ["White", "Black", "Other", "Unknown race", "Total"];

fn columns() -> Vec<Column> {
    vec![
        Column::number("Cases"),
        Column::percent("% Cases"),
        Column::number("Hospitalizations"),
        Column::percent("% Hospitalizations"),
        Column::number("Deaths"),
        Column::percent("% Deaths"),
    ]
}

pub struct Florida;

/// Report date embedded in the PDF link, e.g. `...-2020-06-30-...`.
pub fn report_date(url: &str) -> Result<NaiveDate> {
    let Some(pattern) = REPORT_DATE.as_ref() else {
        return Err(ScrapeError::value("report date pattern failed to compile"));
    };
    let date = pattern
        .captures(url)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| ScrapeError::value(format!("no report date in {}", url)))?;
    Ok(NaiveDate::parse_from_str(date.as_str(), "%Y-%m-%d")?)
}

/// Locate, read and reconcile the race/ethnicity table from one page's words.
pub fn extract_table(words: &[WordBox], page_bound: Rect) -> Result<Reconciled> {
    debug!("Find the table area coordinates");
    let region = locate_table_region(words, page_bound, TOP_ANCHOR, BOTTOM_ANCHOR, TABLE_PAGE_INDEX + 1)?;

    debug!("Parse the table");
    let rows = read_table(words, region, &columns())?;

    debug!("Set the race/ethnicity indices");
    let mut table = DemographicTable::from_rows(rows, &RACES)?;

    reconcile(
        &mut table,
        &ReconcileKeys {
            total: ("Total", ALL_ETHNICITIES),
            subgroup: ("Black", "Non-Hispanic"),
            cases_column: "Cases",
            deaths_column: "Deaths",
        },
    )
}

impl Scraper for Florida {
    fn scrape(&self, ctx: &ScrapeContext<'_>) -> Result<Vec<Record>> {
        debug!("Find daily Florida URL");
        let soup = url_to_soup(ctx.fetch(), COVID_PAGE_URL)?;
        let daily_url = find_link_by_title(&soup, COVID_PAGE_URL, DAILY_REPORT_TITLE)?;
        debug!("{}", daily_url);

        let date = report_date(&daily_url)?;
        info!("Processing data for {}", date);

        let pdf_bytes = ctx.fetch().fetch_bytes(&daily_url, ctx.use_cache())?;
        ctx.save_validation_artifact(&self.name(), "daily_report.pdf", &pdf_bytes)?;

        let pdf = PdfDocument::from_bytes(&pdf_bytes)?;
        let bound = pdf.page_bound(TABLE_PAGE_INDEX)?;
        let words = pdf.page_words(TABLE_PAGE_INDEX)?;
        let figures = extract_table(&words, bound)?;

        let mut record = self.make_record();
        record.date = Some(date);
        record.cases = figures.total_cases;
        record.deaths = figures.total_deaths;
        record.aa_cases = figures.subgroup_cases;
        record.aa_deaths = figures.subgroup_deaths;
        record.pct_aa_cases = figures.pct_cases;
        record.pct_aa_deaths = figures.pct_deaths;
        record.pct_includes_unknown_race = true;
        record.pct_includes_hispanic_black = false;
        Ok(vec![record])
    }
}
