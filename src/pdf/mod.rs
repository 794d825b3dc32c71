//! Minimal PDF text geometry: word boxes, table regions, and stream-mode
//! table reading.
//!
//! Coordinates use a top-left origin with `y` growing downwards, so a region
//! "below" an anchor has a larger `y0`.

pub mod fonts;
pub mod table;
pub mod words;

pub use table::{parse_num, parse_pct, read_table, Column, Converter, TableRow};
pub use words::PdfDocument;

use crate::error::{Result, ScrapeError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }
}

/// One word on a page together with its bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct WordBox {
    pub bbox: Rect,
    pub text: String,
}

impl WordBox {
    pub fn new<S: Into<String>>(x0: f64, y0: f64, x1: f64, y1: f64, text: S) -> Self {
        Self {
            bbox: Rect::new(x0, y0, x1, y1),
            text: text.into(),
        }
    }
}

/// Locate a table spanning from `top_anchor` down to `bottom_anchor`.
///
/// The top anchor is its first occurrence on the page. The bottom anchor is
/// the last occurrence starting in the same (rounded) column and strictly
/// below the top one.
/// The region extends to the right edge of the page. `page_number` is only
/// used in error messages.
pub fn locate_table_region(
    words: &[WordBox],
    page_bound: Rect,
    top_anchor: &str,
    bottom_anchor: &str,
    page_number: usize,
) -> Result<Rect> {
    let top = words
        .iter()
        .find(|w| w.text == top_anchor)
        .map(|w| w.bbox)
        .ok_or_else(|| ScrapeError::MissingAnchor {
            word: top_anchor.to_string(),
            page: page_number,
        })?;

    let bottom = words
        .iter()
        .filter(|w| w.text == bottom_anchor)
        .map(|w| w.bbox)
        .filter(|b| b.x0.round() == top.x0.round() && b.y0.round() > top.y0.round())
        .last()
        .ok_or_else(|| ScrapeError::MissingAnchor {
            word: bottom_anchor.to_string(),
            page: page_number,
        })?;

    Ok(Rect::new(top.x0, top.y0, page_bound.x1, bottom.y1))
}
