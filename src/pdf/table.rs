//! Stream-mode table reading: rows come from text lines, columns from the
//! right edges of the numbers in them.

use super::{Rect, WordBox};
use crate::error::{Result, ScrapeError};
use std::collections::BTreeMap;
use tracing::debug;

/// Right edges closer than this (in points) belong to the same column.
const COLUMN_TOLERANCE: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Converter {
    Number,
    Percent,
}

impl Converter {
    pub fn convert(self, raw: &str) -> Result<f64> {
        match self {
            Converter::Number => parse_num(raw),
            Converter::Percent => parse_pct(raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub converter: Converter,
}

impl Column {
    pub fn number<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), converter: Converter::Number }
    }

    pub fn percent<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), converter: Converter::Percent }
    }
}

/// One table line: the leading text label and converted numeric cells.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub label: String,
    pub values: BTreeMap<String, f64>,
}

impl TableRow {
    /// Cell value, NaN when the column was blank on this line.
    pub fn value(&self, column: &str) -> f64 {
        self.values.get(column).copied().unwrap_or(f64::NAN)
    }
}

/// Parse a count such as `"1,234"`. Blank cells are NaN.
pub fn parse_num(raw: &str) -> Result<f64> {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() {
        return Ok(f64::NAN);
    }
    Ok(cleaned.parse::<f64>()?)
}

/// Parse a percentage such as `"12.5%"` into a fraction (0.125). Blank
/// cells are NaN.
pub fn parse_pct(raw: &str) -> Result<f64> {
    let cleaned = raw.trim();
    let cleaned = cleaned.strip_suffix('%').unwrap_or(cleaned).trim();
    if cleaned.is_empty() {
        return Ok(f64::NAN);
    }
    Ok(cleaned.parse::<f64>()? / 100.0)
}

fn is_value_token(text: &str) -> bool {
    let cleaned: String = text.chars().filter(|c| *c != ',' && *c != '%').collect();
    !cleaned.is_empty() && cleaned.parse::<f64>().is_ok()
}

struct Line<'a> {
    label: String,
    values: Vec<&'a WordBox>,
}

fn group_lines<'a>(words: &[&'a WordBox]) -> Vec<Vec<&'a WordBox>> {
    let mut sorted = words.to_vec();
    sorted.sort_by(|a, b| a.bbox.center().1.total_cmp(&b.bbox.center().1));

    let mut lines: Vec<Vec<&WordBox>> = Vec::new();
    for word in sorted {
        let (_, y) = word.bbox.center();
        match lines.last_mut() {
            Some(line) if (line[0].bbox.center().1 - y).abs() <= line[0].bbox.height() / 2.0 => {
                line.push(word)
            }
            _ => lines.push(vec![word]),
        }
    }
    for line in &mut lines {
        line.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
    }
    lines
}

/// Cluster right edges; returns cluster centres from left to right.
fn column_edges(lines: &[Line]) -> Vec<f64> {
    let mut edges: Vec<f64> = lines
        .iter()
        .flat_map(|line| line.values.iter().map(|w| w.bbox.x1))
        .collect();
    edges.sort_by(f64::total_cmp);

    let mut clusters: Vec<Vec<f64>> = Vec::new();
    for edge in edges {
        match clusters.last_mut() {
            Some(cluster) if edge - cluster[cluster.len() - 1] <= COLUMN_TOLERANCE => cluster.push(edge),
            _ => clusters.push(vec![edge]),
        }
    }
    clusters
        .iter()
        .map(|c| c.iter().sum::<f64>() / c.len() as f64)
        .collect()
}

fn nearest(edges: &[f64], x: f64) -> usize {
    edges
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - x).abs().total_cmp(&(*b - x).abs()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Read the table inside `region`. Each line's leading non-numeric words
/// form its label; the remaining tokens are converted per column.
pub fn read_table(words: &[WordBox], region: Rect, columns: &[Column]) -> Result<Vec<TableRow>> {
    let inside: Vec<&WordBox> = words
        .iter()
        .filter(|w| {
            let (x, y) = w.bbox.center();
            region.contains_point(x, y)
        })
        .collect();

    let lines: Vec<Line> = group_lines(&inside)
        .into_iter()
        .map(|line| {
            let split = line
                .iter()
                .position(|w| is_value_token(&w.text))
                .unwrap_or(line.len());
            let label = line[..split]
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            Line { label, values: line[split..].to_vec() }
        })
        .collect();

    let edges = column_edges(&lines);
    let by_edge = edges.len() == columns.len();
    debug!(
        "Table region has {} lines and {} value columns ({})",
        lines.len(),
        edges.len(),
        if by_edge { "aligned by right edge" } else { "left fill" }
    );

    let mut rows = Vec::with_capacity(lines.len());
    for line in lines {
        if line.values.len() > columns.len() {
            return Err(ScrapeError::value(format!(
                "row {:?} has {} values but the table has {} columns",
                line.label,
                line.values.len(),
                columns.len()
            )));
        }

        let mut values = BTreeMap::new();
        for (position, word) in line.values.iter().enumerate() {
            let index = if by_edge { nearest(&edges, word.bbox.x1) } else { position };
            let column = &columns[index];
            if values.contains_key(&column.name) {
                return Err(ScrapeError::value(format!(
                    "row {:?} has two values in column {:?}",
                    line.label, column.name
                )));
            }
            values.insert(column.name.clone(), column.converter.convert(&word.text)?);
        }
        for column in columns {
            values.entry(column.name.clone()).or_insert(f64::NAN);
        }
        rows.push(TableRow { label: line.label, values });
    }
    Ok(rows)
}
