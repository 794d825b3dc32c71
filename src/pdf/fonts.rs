//! Font resources needed to turn shown strings into text and advances:
//! code width (Type0 fonts use two-byte codes), ToUnicode CMaps, simple-font
//! `/Differences`, and glyph widths from `/Widths` or `/W`.

use lopdf::{Dictionary, Document, Object, ObjectId};
use regex::bytes::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

/// Fonts keyed by their resource name (`F1`, `TT2`, ...).
pub type FontMap = HashMap<Vec<u8>, FontMetrics>;

/// Default glyph width for CID fonts without `/DW`, in thousandths of an em.
const DEFAULT_CID_WIDTH: f64 = 1000.0;

/// bfrange spans wider than this are treated as malformed.
const MAX_RANGE_SPAN: u32 = 0xFFFF;

static CMAP_TOKEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"<([0-9A-Fa-f\s]*)>|(\[)|(\])|([A-Za-z]+)").ok());

/// One decoded character code.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub text: String,
    /// Advance in ems, when the font says.
    pub width: Option<f64>,
    /// Single-byte code 32, the only code word spacing applies to.
    pub is_space_code: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FontMetrics {
    two_byte: bool,
    to_unicode: HashMap<u32, String>,
    differences: HashMap<u32, char>,
    widths: HashMap<u32, f64>,
    default_width: Option<f64>,
}

impl FontMetrics {
    pub fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let subtype = font.get(b"Subtype").and_then(Object::as_name).unwrap_or_default();
        let mut metrics = FontMetrics {
            two_byte: subtype == b"Type0",
            ..Default::default()
        };

        if let Some(stream) = font
            .get(b"ToUnicode")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_stream().ok())
        {
            let bytes = if stream.dict.get(b"Filter").is_ok() {
                stream.decompressed_content().unwrap_or_default()
            } else {
                stream.content.clone()
            };
            metrics.to_unicode = parse_to_unicode(&bytes);
        }

        if metrics.two_byte {
            metrics.read_cid_widths(doc, font);
        } else {
            metrics.read_simple_widths(doc, font);
            metrics.read_differences(doc, font);
        }
        metrics
    }

    /// Split `bytes` into codes and decode each one.
    pub fn decode(&self, bytes: &[u8]) -> Vec<Glyph> {
        let codes: Vec<u32> = if self.two_byte {
            bytes
                .chunks(2)
                .map(|pair| pair.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
                .collect()
        } else {
            bytes.iter().map(|b| u32::from(*b)).collect()
        };

        codes
            .into_iter()
            .map(|code| Glyph {
                text: self.code_text(code),
                width: self
                    .widths
                    .get(&code)
                    .copied()
                    .or(self.default_width)
                    .map(|w| w / 1000.0),
                is_space_code: !self.two_byte && code == 32,
            })
            .collect()
    }

    fn code_text(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.get(&code) {
            return text.clone();
        }
        if let Some(ch) = self.differences.get(&code) {
            return ch.to_string();
        }
        if self.two_byte {
            // Identity mapping without a CMap carries no text.
            return '\u{FFFD}'.to_string();
        }
        char::from_u32(code).map(String::from).unwrap_or_default()
    }

    fn read_simple_widths(&mut self, doc: &Document, font: &Dictionary) {
        let first = font.get(b"FirstChar").ok().and_then(|o| resolve(doc, o).as_i64().ok());
        let widths = font.get(b"Widths").ok().and_then(|o| resolve(doc, o).as_array().ok());
        if let (Some(first), Some(widths)) = (first, widths) {
            for (offset, width) in widths.iter().enumerate() {
                if let Some(w) = number(resolve(doc, width)) {
                    self.widths.insert(first as u32 + offset as u32, w);
                }
            }
        }
    }

    fn read_cid_widths(&mut self, doc: &Document, font: &Dictionary) {
        let descendant = font
            .get(b"DescendantFonts")
            .ok()
            .and_then(|o| resolve(doc, o).as_array().ok())
            .and_then(|fonts| fonts.first())
            .and_then(|o| resolve(doc, o).as_dict().ok());
        let Some(descendant) = descendant else {
            self.default_width = Some(DEFAULT_CID_WIDTH);
            return;
        };

        self.default_width = Some(
            descendant
                .get(b"DW")
                .ok()
                .and_then(|o| number(resolve(doc, o)))
                .unwrap_or(DEFAULT_CID_WIDTH),
        );

        let Some(entries) = descendant.get(b"W").ok().and_then(|o| resolve(doc, o).as_array().ok()) else {
            return;
        };
        // `c [w1 w2 ...]` or `c_first c_last w`
        let mut i = 0;
        while i < entries.len() {
            let Some(start) = number(resolve(doc, &entries[i])) else {
                break;
            };
            match entries.get(i + 1).map(|o| resolve(doc, o)) {
                Some(Object::Array(list)) => {
                    for (offset, width) in list.iter().enumerate() {
                        if let Some(w) = number(resolve(doc, width)) {
                            self.widths.insert(start as u32 + offset as u32, w);
                        }
                    }
                    i += 2;
                }
                Some(end) => {
                    let (Some(end), Some(w)) =
                        (number(end), entries.get(i + 2).and_then(|o| number(resolve(doc, o))))
                    else {
                        break;
                    };
                    for code in start as u32..=(end as u32).min(start as u32 + MAX_RANGE_SPAN) {
                        self.widths.insert(code, w);
                    }
                    i += 3;
                }
                None => break,
            }
        }
    }

    fn read_differences(&mut self, doc: &Document, font: &Dictionary) {
        let Some(encoding) = font
            .get(b"Encoding")
            .ok()
            .and_then(|o| resolve(doc, o).as_dict().ok())
        else {
            return;
        };
        let Some(differences) = encoding
            .get(b"Differences")
            .ok()
            .and_then(|o| resolve(doc, o).as_array().ok())
        else {
            return;
        };

        let mut code = 0u32;
        for item in differences {
            match resolve(doc, item) {
                Object::Integer(n) => code = *n as u32,
                Object::Name(name) => {
                    if let Some(ch) = glyph_name_char(name) {
                        self.differences.insert(code, ch);
                    }
                    code += 1;
                }
                _ => {}
            }
        }
    }
}

/// Fonts visible to a page, following `/Resources` inheritance.
pub fn page_fonts(doc: &Document, page_id: ObjectId) -> FontMap {
    let mut fonts = FontMap::new();
    let mut current = Some(page_id);
    while let Some(id) = current {
        let Ok(dict) = doc.get_dictionary(id) else {
            break;
        };
        let font_dict = dict
            .get(b"Resources")
            .ok()
            .and_then(|o| resolve(doc, o).as_dict().ok())
            .and_then(|resources| resources.get(b"Font").ok())
            .and_then(|o| resolve(doc, o).as_dict().ok());
        if let Some(font_dict) = font_dict {
            for (name, font) in font_dict.iter() {
                if fonts.contains_key(name) {
                    continue;
                }
                if let Ok(font) = resolve(doc, font).as_dict() {
                    fonts.insert(name.clone(), FontMetrics::from_dict(doc, font));
                }
            }
            // Nearest Resources wins.
            break;
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    debug!("Resolved {} font(s)", fonts.len());
    fonts
}

/// Decoding used when the current font is unknown: UTF-16BE with a BOM,
/// otherwise one Latin-1 character per byte.
pub fn decode_without_font(bytes: &[u8]) -> Vec<Glyph> {
    let text = if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    };
    text.chars()
        .map(|ch| Glyph {
            text: ch.to_string(),
            width: None,
            is_space_code: ch == ' ',
        })
        .collect()
}

/// Rough glyph advance in ems for standard sans-serif fonts, used when the
/// font carries no width for a code.
pub fn estimated_width(text: &str) -> f64 {
    text.chars()
        .map(|ch| match ch {
            ' ' | ',' | '.' => 0.278,
            '%' => 0.889,
            '0'..='9' => 0.556,
            'i' | 'j' | 'l' => 0.222,
            'm' | 'w' => 0.833,
            c if c.is_ascii_uppercase() => 0.667,
            _ => 0.5,
        })
        .sum()
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    doc.dereference(object).map(|(_, o)| o).unwrap_or(object)
}

fn number(object: &Object) -> Option<f64> {
    object.as_float().ok().map(f64::from)
}

fn hex_bytes(digits: &[u8]) -> Vec<u8> {
    let clean: Vec<u8> = digits.iter().copied().filter(u8::is_ascii_hexdigit).collect();
    clean
        .chunks(2)
        .filter_map(|pair| {
            let s = std::str::from_utf8(pair).ok()?;
            let padded = if s.len() == 1 { format!("{}0", s) } else { s.to_string() };
            u8::from_str_radix(&padded, 16).ok()
        })
        .collect()
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [lo] => u16::from(*lo),
            _ => 0,
        })
        .collect()
}

#[derive(Debug)]
enum CMapValue {
    Hex(Vec<u8>),
    Array(Vec<Vec<u8>>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Char,
    Range,
}

/// `bfchar` and `bfrange` entries of a ToUnicode CMap.
pub(crate) fn parse_to_unicode(cmap: &[u8]) -> HashMap<u32, String> {
    let mut map = HashMap::new();
    let mut section: Option<Section> = None;
    let mut values: Vec<CMapValue> = Vec::new();
    let mut array: Option<Vec<Vec<u8>>> = None;
    let Some(tokens) = CMAP_TOKEN.as_ref() else {
        return map;
    };

    for caps in tokens.captures_iter(cmap) {
        if let Some(keyword) = caps.get(4) {
            match keyword.as_bytes() {
                b"beginbfchar" => section = Some(Section::Char),
                b"beginbfrange" => section = Some(Section::Range),
                b"endbfchar" | b"endbfrange" => section = None,
                _ => {}
            }
            values.clear();
            continue;
        }
        let Some(current) = section else {
            continue;
        };

        if caps.get(2).is_some() {
            array = Some(Vec::new());
            continue;
        }
        if caps.get(3).is_some() {
            if let Some(items) = array.take() {
                values.push(CMapValue::Array(items));
            }
        } else if let Some(hex) = caps.get(1) {
            let bytes = hex_bytes(hex.as_bytes());
            match array.as_mut() {
                Some(items) => {
                    items.push(bytes);
                    continue;
                }
                None => values.push(CMapValue::Hex(bytes)),
            }
        }

        let complete = match (current, values.as_slice()) {
            (Section::Char, [CMapValue::Hex(src), CMapValue::Hex(dst)]) => {
                map.insert(code_of(src), String::from_utf16_lossy(&utf16_units(dst)));
                true
            }
            (Section::Range, [CMapValue::Hex(lo), CMapValue::Hex(hi), dst]) => {
                let (lo, hi) = (code_of(lo), code_of(hi));
                let hi = hi.min(lo.saturating_add(MAX_RANGE_SPAN));
                match dst {
                    CMapValue::Hex(start) => {
                        let units = utf16_units(start);
                        for (offset, code) in (lo..=hi).enumerate() {
                            let mut units = units.clone();
                            if let Some(last) = units.last_mut() {
                                *last = last.wrapping_add(offset as u16);
                            }
                            map.insert(code, String::from_utf16_lossy(&units));
                        }
                    }
                    CMapValue::Array(items) => {
                        for (code, item) in (lo..=hi).zip(items) {
                            map.insert(code, String::from_utf16_lossy(&utf16_units(item)));
                        }
                    }
                }
                true
            }
            _ => false,
        };
        if complete {
            values.clear();
        }
    }
    map
}

/// Standard glyph names for the characters these reports use, plus `uniXXXX`.
fn glyph_name_char(name: &[u8]) -> Option<char> {
    let name = std::str::from_utf8(name).ok()?;
    if name.len() == 1 {
        return name.chars().next().filter(char::is_ascii_alphabetic);
    }
    if let Some(hex) = name.strip_prefix("uni") {
        return u32::from_str_radix(hex.get(..4)?, 16).ok().and_then(char::from_u32);
    }
    let ch = match name {
        "space" => ' ',
        "zero" => '0',
        "one" => '1',
        "two" => '2',
        "three" => '3',
        "four" => '4',
        "five" => '5',
        "six" => '6',
        "seven" => '7',
        "eight" => '8',
        "nine" => '9',
        "comma" => ',',
        "period" => '.',
        "percent" => '%',
        "hyphen" | "minus" => '-',
        "slash" => '/',
        "colon" => ':',
        "parenleft" => '(',
        "parenright" => ')',
        _ => return None,
    };
    Some(ch)
}
