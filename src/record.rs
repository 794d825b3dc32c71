use crate::error::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Status value carried by every successfully extracted row.
pub const SUCCESS: &str = "SUCCESS";

/// One normalized row: statistics for one location on one date.
///
/// Counts and percentages are `f64` so that values a source does not publish
/// can be carried as NaN instead of being dropped from the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "Date Published")]
    pub date: Option<NaiveDate>,
    #[serde(rename = "Total Cases")]
    pub cases: f64,
    #[serde(rename = "Total Deaths")]
    pub deaths: f64,
    #[serde(rename = "Count Cases Black/AA")]
    pub aa_cases: f64,
    #[serde(rename = "Count Deaths Black/AA")]
    pub aa_deaths: f64,
    #[serde(rename = "Pct Cases Black/AA")]
    pub pct_aa_cases: f64,
    #[serde(rename = "Pct Deaths Black/AA")]
    pub pct_aa_deaths: f64,
    #[serde(rename = "Pct Includes Unknown Race")]
    pub pct_includes_unknown_race: bool,
    #[serde(rename = "Pct Includes Hispanic Black")]
    pub pct_includes_hispanic_black: bool,
    #[serde(rename = "Status code")]
    pub status: String,
}

/// Report column names in output order.
pub const COLUMNS: [&str; 11] = [
    "Location",
    "Date Published",
    "Total Cases",
    "Total Deaths",
    "Count Cases Black/AA",
    "Count Deaths Black/AA",
    "Pct Cases Black/AA",
    "Pct Deaths Black/AA",
    "Pct Includes Unknown Race",
    "Pct Includes Hispanic Black",
    "Status code",
];

impl Record {
    pub fn new<S: Into<String>>(location: S) -> Self {
        Self {
            location: location.into(),
            date: None,
            cases: f64::NAN,
            deaths: f64::NAN,
            aa_cases: f64::NAN,
            aa_deaths: f64::NAN,
            pct_aa_cases: f64::NAN,
            pct_aa_deaths: f64::NAN,
            pct_includes_unknown_race: false,
            pct_includes_hispanic_black: false,
            status: SUCCESS.to_string(),
        }
    }

    pub fn with_status<S: Into<String>>(mut self, status: S) -> Self {
        self.status = status.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == SUCCESS
    }
}

/// The rows produced by one or more scraper runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultTable {
    rows: Vec<Record>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }

    pub fn push(&mut self, record: Record) {
        self.rows.push(record);
    }

    pub fn append(&mut self, other: ResultTable) {
        self.rows.extend(other.rows);
    }

    /// Rows whose status is anything other than [`SUCCESS`].
    pub fn failures(&self) -> impl Iterator<Item = &Record> {
        self.rows.iter().filter(|r| !r.is_success())
    }

    /// Write the table as CSV. The header row is written even when the table is empty.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        csv_writer.write_record(COLUMNS)?;
        for record in &self.rows {
            csv_writer.serialize(record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

impl From<Vec<Record>> for ResultTable {
    fn from(rows: Vec<Record>) -> Self {
        Self { rows }
    }
}

impl FromIterator<Record> for ResultTable {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let record = Record::new("Georgia");
        assert_eq!(record.location, "Georgia");
        assert!(record.date.is_none());
        assert!(record.cases.is_nan());
        assert!(record.pct_aa_deaths.is_nan());
        assert!(!record.pct_includes_unknown_race);
        assert!(record.is_success());
    }

    #[test]
    fn test_failures_filter() {
        let table: ResultTable = vec![
            Record::new("A"),
            Record::new("B").with_status("ERROR: Value('x')"),
        ]
        .into();

        let failed: Vec<_> = table.failures().map(|r| r.location.as_str()).collect();
        assert_eq!(failed, vec!["B"]);
    }

    #[test]
    fn test_csv_output_keeps_column_order() {
        let mut record = Record::new("Georgia");
        record.date = NaiveDate::from_ymd_opt(2020, 6, 30);
        record.cases = 1000.0;
        record.deaths = 50.0;
        let table = ResultTable::from(vec![record]);

        let mut buffer = Vec::new();
        table.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();

        assert_eq!(lines.next().unwrap(), COLUMNS.join(","));
        let row = lines.next().unwrap();
        assert!(row.starts_with("Georgia,2020-06-30,1000.0,50.0,NaN"));
        assert!(row.ends_with("false,false,SUCCESS"));
    }

    #[test]
    fn test_empty_table_still_writes_header() {
        let mut buffer = Vec::new();
        ResultTable::new().write_csv(&mut buffer).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap().lines().count(), 1);
    }
}
