//! Subgroup percentages from demographic tables indexed by race and
//! ethnicity.

use crate::error::{Result, ScrapeError};
use crate::pdf::TableRow;
use tracing::debug;

pub const ALL_ETHNICITIES: &str = "All ethnicities";

/// `round(100 * part / total, 2)`; NaN when the total is zero or either
/// side is NaN.
pub fn to_percentage(part: f64, total: f64) -> f64 {
    if total == 0.0 || total.is_nan() || part.is_nan() {
        return f64::NAN;
    }
    round2(100.0 * part / total)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone)]
struct IndexedRow {
    race: String,
    ethnicity: String,
    row: TableRow,
}

/// Table rows keyed by (race, ethnicity).
///
/// A row labelled with one of the known races starts a new race block with
/// ethnicity [`ALL_ETHNICITIES`]; any other label is an ethnicity within the
/// most recent race.
#[derive(Debug, Clone)]
pub struct DemographicTable {
    rows: Vec<IndexedRow>,
}

impl DemographicTable {
    pub fn from_rows(rows: Vec<TableRow>, races: &[&str]) -> Result<Self> {
        let mut indexed = Vec::with_capacity(rows.len());
        let mut race: Option<String> = None;
        for row in rows {
            let ethnicity = if races.contains(&row.label.as_str()) {
                race = Some(row.label.clone());
                ALL_ETHNICITIES.to_string()
            } else {
                row.label.clone()
            };
            let current = race.clone().ok_or_else(|| {
                ScrapeError::value(format!("row {:?} appears before any race row", row.label))
            })?;
            indexed.push(IndexedRow { race: current, ethnicity, row });
        }
        Ok(Self { rows: indexed })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, race: &str, ethnicity: &str) -> Result<&TableRow> {
        self.rows
            .iter()
            .find(|r| r.race == race && r.ethnicity == ethnicity)
            .map(|r| &r.row)
            .ok_or_else(|| missing_row(race, ethnicity))
    }

    /// Replace NaN and zero cells of one row with `fill`.
    pub fn fill_missing(&mut self, race: &str, ethnicity: &str, fill: f64) -> Result<()> {
        let entry = self
            .rows
            .iter_mut()
            .find(|r| r.race == race && r.ethnicity == ethnicity)
            .ok_or_else(|| missing_row(race, ethnicity))?;
        for (column, value) in entry.row.values.iter_mut() {
            if value.is_nan() || *value == 0.0 {
                debug!("Filling {}/{} {} with {}", race, ethnicity, column, fill);
                *value = fill;
            }
        }
        Ok(())
    }

    /// Whole count in one cell, truncated toward zero.
    pub fn count(&self, race: &str, ethnicity: &str, column: &str) -> Result<f64> {
        let row = self.get(race, ethnicity)?;
        let value = *row
            .values
            .get(column)
            .ok_or_else(|| ScrapeError::MissingColumn { column: column.to_string() })?;
        if value.is_nan() {
            return Err(ScrapeError::value(format!(
                "cannot convert float NaN to integer ({}/{} {})",
                race, ethnicity, column
            )));
        }
        Ok(value.trunc())
    }
}

fn missing_row(race: &str, ethnicity: &str) -> ScrapeError {
    ScrapeError::MissingRow { key: format!("{}/{}", race, ethnicity) }
}

/// Totals and subgroup figures for cases and deaths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciled {
    pub total_cases: f64,
    pub total_deaths: f64,
    pub subgroup_cases: f64,
    pub subgroup_deaths: f64,
    pub pct_cases: f64,
    pub pct_deaths: f64,
}

/// Names of the rows and columns a reconciliation reads.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileKeys<'a> {
    pub total: (&'a str, &'a str),
    pub subgroup: (&'a str, &'a str),
    pub cases_column: &'a str,
    pub deaths_column: &'a str,
}

/// Fill the total row's missing cells with 1, then compute subgroup
/// percentages of the totals.
pub fn reconcile(table: &mut DemographicTable, keys: &ReconcileKeys) -> Result<Reconciled> {
    let (total_race, total_ethnicity) = keys.total;
    let (sub_race, sub_ethnicity) = keys.subgroup;
    table.fill_missing(total_race, total_ethnicity, 1.0)?;

    let total_cases = table.count(total_race, total_ethnicity, keys.cases_column)?;
    let total_deaths = table.count(total_race, total_ethnicity, keys.deaths_column)?;
    let subgroup_cases = table.count(sub_race, sub_ethnicity, keys.cases_column)?;
    let subgroup_deaths = table.count(sub_race, sub_ethnicity, keys.deaths_column)?;

    Ok(Reconciled {
        total_cases,
        total_deaths,
        subgroup_cases,
        subgroup_deaths,
        pct_cases: to_percentage(subgroup_cases, total_cases),
        pct_deaths: to_percentage(subgroup_deaths, total_deaths),
    })
}
