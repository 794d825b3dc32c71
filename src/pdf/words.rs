use super::fonts::{decode_without_font, estimated_width, page_fonts, FontMap, FontMetrics};
use super::{Rect, WordBox};
use crate::error::{Result, ScrapeError};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId};
use tracing::debug;

/// US Letter, used when a page tree carries no MediaBox at all.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Parent chains deeper than this are treated as malformed.
const MAX_PAGE_TREE_DEPTH: usize = 32;

/// Kerning in a `TJ` array at or beyond this many thousandths of an em
/// separates words.
const TJ_WORD_BREAK: f64 = 250.0;

pub struct PdfDocument {
    doc: Document,
}

impl PdfDocument {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            doc: Document::load_mem(bytes)?,
        })
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Page bound in top-left coordinates: `(0, 0, width, height)`.
    pub fn page_bound(&self, index: usize) -> Result<Rect> {
        let media_box = self.media_box(self.page_id(index)?)?;
        Ok(Rect::new(
            0.0,
            0.0,
            media_box.x1 - media_box.x0,
            media_box.y1 - media_box.y0,
        ))
    }

    /// Word boxes on a page (zero-based index), in content-stream order.
    pub fn page_words(&self, index: usize) -> Result<Vec<WordBox>> {
        let page_id = self.page_id(index)?;
        let media_box = self.media_box(page_id)?;
        let content = Content::decode(&self.doc.get_page_content(page_id)?)?;
        let fonts = page_fonts(&self.doc, page_id);
        let words = words_from_operations(&content.operations, media_box, &fonts);
        debug!("Page {} yielded {} words", index + 1, words.len());
        Ok(words)
    }

    fn page_id(&self, index: usize) -> Result<ObjectId> {
        let pages = self.doc.get_pages();
        pages
            .get(&(index as u32 + 1))
            .copied()
            .ok_or_else(|| {
                ScrapeError::value(format!(
                    "page index {} out of range ({} pages)",
                    index,
                    pages.len()
                ))
            })
    }

    /// MediaBox in PDF user space, following inheritance up the page tree.
    fn media_box(&self, page_id: ObjectId) -> Result<Rect> {
        let mut current = page_id;
        for _ in 0..MAX_PAGE_TREE_DEPTH {
            let dict = self.doc.get_dictionary(current)?;
            if let Ok(value) = dict.get(b"MediaBox") {
                let (_, value) = self.doc.dereference(value)?;
                let numbers = value
                    .as_array()?
                    .iter()
                    .map(|n| n.as_float().map(f64::from))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                if numbers.len() != 4 {
                    return Err(ScrapeError::value("MediaBox must have four numbers"));
                }
                return Ok(Rect::new(numbers[0], numbers[1], numbers[2], numbers[3]));
            }
            match dict.get(b"Parent").and_then(Object::as_reference) {
                Ok(parent) => current = parent,
                Err(_) => break,
            }
        }
        let [x0, y0, x1, y1] = DEFAULT_MEDIA_BOX;
        Ok(Rect::new(x0, y0, x1, y1))
    }
}

/// Affine transform in PDF row-vector convention: `[x y 1] × M`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 };

    fn translate(tx: f64, ty: f64) -> Self {
        Matrix { e: tx, f: ty, ..Self::IDENTITY }
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        let n: Vec<f64> = operands.iter().filter_map(number).collect();
        (n.len() == 6).then(|| Matrix { a: n[0], b: n[1], c: n[2], d: n[3], e: n[4], f: n[5] })
    }

    /// `self × other`
    fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.a + y * self.c + self.e, x * self.b + y * self.d + self.f)
    }

    fn vertical_scale(&self) -> f64 {
        (self.c * self.c + self.d * self.d).sqrt()
    }
}

fn number(object: &Object) -> Option<f64> {
    object.as_float().ok().map(f64::from)
}

#[derive(Debug)]
struct PendingWord {
    text: String,
    x0: f64,
    x1: f64,
    baseline: f64,
    size: f64,
}

struct TextState<'a> {
    fonts: &'a FontMap,
    font: Option<&'a FontMetrics>,
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    tm: Matrix,
    tlm: Matrix,
    font_size: f64,
    leading: f64,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scale: f64,
    media_box: Rect,
    pending: Option<PendingWord>,
    words: Vec<WordBox>,
}

impl<'a> TextState<'a> {
    fn new(media_box: Rect, fonts: &'a FontMap) -> Self {
        Self {
            fonts,
            font: None,
            ctm: Matrix::IDENTITY,
            ctm_stack: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            font_size: 0.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            media_box,
            pending: None,
            words: Vec::new(),
        }
    }

    fn flush(&mut self) {
        if let Some(word) = self.pending.take() {
            let top = self.media_box.y1;
            let left = self.media_box.x0;
            self.words.push(WordBox::new(
                word.x0 - left,
                top - (word.baseline + 0.8 * word.size),
                word.x1 - left,
                top - (word.baseline - 0.2 * word.size),
                word.text,
            ));
        }
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.flush();
        self.tlm = Matrix::translate(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        let leading = self.leading;
        self.move_line(0.0, -leading);
    }

    fn advance(&mut self, tx: f64) {
        self.tm = Matrix::translate(tx, 0.0).then(&self.tm);
    }

    fn show(&mut self, bytes: &[u8]) {
        let glyphs = match self.font {
            Some(font) => font.decode(bytes),
            None => decode_without_font(bytes),
        };
        for glyph in glyphs {
            let device = self.tm.then(&self.ctm);
            let (x, baseline) = device.apply(0.0, 0.0);
            let size = self.font_size * device.vertical_scale();

            let width = glyph.width.unwrap_or_else(|| estimated_width(&glyph.text));
            let mut tx = width * self.font_size + self.char_spacing;
            if glyph.is_space_code {
                tx += self.word_spacing;
            }
            tx *= self.horizontal_scale;
            self.advance(tx);
            let (x_end, _) = self.tm.then(&self.ctm).apply(0.0, 0.0);

            if glyph.text.is_empty() || glyph.text.chars().all(char::is_whitespace) {
                self.flush();
                continue;
            }

            let continues = self.pending.as_ref().is_some_and(|w| {
                (w.baseline - baseline).abs() < 0.5 && (x - w.x1).abs() < 0.3 * size.max(1.0)
            });
            if !continues {
                self.flush();
            }

            match self.pending.as_mut() {
                Some(word) if continues => {
                    word.text.push_str(&glyph.text);
                    word.x1 = x_end;
                }
                _ => {
                    self.pending = Some(PendingWord {
                        text: glyph.text,
                        x0: x,
                        x1: x_end,
                        baseline,
                        size,
                    });
                }
            }
        }
    }

    fn apply(&mut self, op: &Operation) {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => self.ctm_stack.push(self.ctm),
            "Q" => {
                self.flush();
                if let Some(ctm) = self.ctm_stack.pop() {
                    self.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    self.ctm = m.then(&self.ctm);
                }
            }
            "BT" => {
                self.flush();
                self.tm = Matrix::IDENTITY;
                self.tlm = Matrix::IDENTITY;
            }
            "ET" => self.flush(),
            "Tf" => {
                let fonts = self.fonts;
                self.font = operands
                    .first()
                    .and_then(|name| name.as_name().ok())
                    .and_then(|name| fonts.get(name));
                if let Some(size) = operands.get(1).and_then(number) {
                    self.font_size = size;
                }
            }
            "TL" => {
                if let Some(leading) = operands.first().and_then(number) {
                    self.leading = leading;
                }
            }
            "Tc" => {
                if let Some(spacing) = operands.first().and_then(number) {
                    self.char_spacing = spacing;
                }
            }
            "Tw" => {
                if let Some(spacing) = operands.first().and_then(number) {
                    self.word_spacing = spacing;
                }
            }
            "Tz" => {
                if let Some(scale) = operands.first().and_then(number) {
                    self.horizontal_scale = scale / 100.0;
                }
            }
            "Td" | "TD" => {
                let tx = operands.first().and_then(number).unwrap_or(0.0);
                let ty = operands.get(1).and_then(number).unwrap_or(0.0);
                if op.operator == "TD" {
                    self.leading = -ty;
                }
                self.move_line(tx, ty);
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    self.flush();
                    self.tlm = m;
                    self.tm = m;
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "'" => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "\"" => {
                if let Some(spacing) = operands.first().and_then(number) {
                    self.word_spacing = spacing;
                }
                if let Some(spacing) = operands.get(1).and_then(number) {
                    self.char_spacing = spacing;
                }
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    self.show(bytes);
                }
            }
            "TJ" => {
                if let Some(Ok(items)) = operands.first().map(Object::as_array) {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => self.show(bytes),
                            other => {
                                if let Some(adjust) = number(other) {
                                    if adjust <= -TJ_WORD_BREAK {
                                        self.flush();
                                    }
                                    let tx = -adjust / 1000.0 * self.font_size * self.horizontal_scale;
                                    self.advance(tx);
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

/// Interpret text operators and collect word boxes in top-left coordinates
/// relative to `media_box`.
pub(crate) fn words_from_operations(
    operations: &[Operation],
    media_box: Rect,
    fonts: &FontMap,
) -> Vec<WordBox> {
    let mut state = TextState::new(media_box, fonts);
    for op in operations {
        state.apply(op);
    }
    state.flush();
    state.words
}

#[cfg(test)]
pub(crate) mod test_support {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream, StringFormat};

    /// Single-page Helvetica document; each entry is `(x, baseline, text)`.
    /// The MediaBox lives on the page tree root so lookups must inherit it.
    pub fn build_pdf(lines: &[(i64, i64, &str)], pages: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for page in 0..pages {
            let mut operations = Vec::new();
            if page + 1 == pages {
                for (x, y, text) in lines {
                    operations.push(Operation::new("BT", vec![]));
                    operations.push(Operation::new(
                        "Tf",
                        vec![Object::Name(b"F1".to_vec()), Object::Integer(10)],
                    ));
                    operations.push(Operation::new(
                        "Td",
                        vec![Object::Integer(*x), Object::Integer(*y)],
                    ));
                    operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
                    operations.push(Operation::new("ET", vec![]));
                }
            }
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(pages as i64),
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(500),
                Object::Integer(800),
            ],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    /// Glyph id for an ASCII character in [`build_identity_pdf`] fonts.
    pub fn glyph_id(ch: char) -> u16 {
        ch as u16 - 29
    }

    /// Single-page document set in a Type0 / Identity-H font: text is shown
    /// as two-byte glyph ids, readable only through the ToUnicode CMap.
    pub fn build_identity_pdf(lines: &[(i64, i64, &str)]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let cmap = "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
            1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n\
            1 beginbfrange\n<0003> <005D> <0020>\nendbfrange\nendcmap\n";
        let cmap_id = doc.add_object(Stream::new(dictionary! {}, cmap.as_bytes().to_vec()));
        let descendant_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => "ABCDEF+Arial",
            "DW" => Object::Integer(600),
            "W" => vec![
                Object::Integer(3),
                Object::Array(vec![Object::Integer(278)]),
                Object::Integer(19),
                Object::Integer(28),
                Object::Integer(556),
            ],
        });
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "ABCDEF+Arial",
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(descendant_id)],
            "ToUnicode" => cmap_id,
        });

        let mut operations = Vec::new();
        for (x, y, text) in lines {
            let encoded: Vec<u8> = text
                .chars()
                .flat_map(|ch| glyph_id(ch).to_be_bytes())
                .collect();
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new(
                "Tf",
                vec![Object::Name(b"C0".to_vec()), Object::Integer(10)],
            ));
            operations.push(Operation::new("Td", vec![Object::Integer(*x), Object::Integer(*y)]));
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(encoded, StringFormat::Hexadecimal)],
            ));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "C0" => font_id },
            },
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(500),
                Object::Integer(800),
            ],
        });

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => Object::Integer(1),
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{build_identity_pdf, build_pdf};
    use crate::pdf::locate_table_region;
    use super::*;

    fn media_box() -> Rect {
        Rect::new(0.0, 0.0, 500.0, 800.0)
    }

    fn texts(words: &[WordBox]) -> Vec<&str> {
        words.iter().map(|w| w.text.as_str()).collect()
    }

    #[test]
    fn test_tj_splits_on_spaces() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(10)]),
            Operation::new("Td", vec![Object::Integer(100), Object::Integer(700)]),
            Operation::new("Tj", vec![Object::string_literal("Unknown race 1,234")]),
            Operation::new("ET", vec![]),
        ];

        let words = words_from_operations(&ops, media_box(), &FontMap::new());
        assert_eq!(texts(&words), vec!["Unknown", "race", "1,234"]);
        assert_eq!(words[0].bbox.x0, 100.0);
        assert!((words[0].bbox.y0 - 92.0).abs() < 1e-9);
        assert!((words[0].bbox.y1 - 102.0).abs() < 1e-9);
        assert!(words[1].bbox.x0 > words[0].bbox.x1);
    }

    #[test]
    fn test_tj_array_kerning_breaks_words() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(10)]),
            Operation::new("Tm", vec![
                Object::Integer(1), Object::Integer(0), Object::Integer(0),
                Object::Integer(1), Object::Integer(50), Object::Integer(500),
            ]),
            Operation::new("TJ", vec![Object::Array(vec![
                Object::string_literal("Bla"),
                Object::Integer(-20),
                Object::string_literal("ck"),
                Object::Integer(-3000),
                Object::string_literal("42"),
            ])]),
            Operation::new("ET", vec![]),
        ];

        let words = words_from_operations(&ops, media_box(), &FontMap::new());
        assert_eq!(texts(&words), vec!["Black", "42"]);
        assert_eq!(words[0].bbox.x0, 50.0);
        assert!(words[1].bbox.x0 > 80.0);
    }

    #[test]
    fn test_td_moves_to_new_word_and_cm_translates() {
        let ops = vec![
            Operation::new("q", vec![]),
            Operation::new("cm", vec![
                Object::Integer(1), Object::Integer(0), Object::Integer(0),
                Object::Integer(1), Object::Integer(10), Object::Integer(0),
            ]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(10)]),
            Operation::new("Td", vec![Object::Integer(20), Object::Integer(300)]),
            Operation::new("Tj", vec![Object::string_literal("White")]),
            Operation::new("TD", vec![Object::Integer(0), Object::Integer(-20)]),
            Operation::new("Tj", vec![Object::string_literal("Black")]),
            Operation::new("T*", vec![]),
            Operation::new("Tj", vec![Object::string_literal("Total")]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ];

        let words = words_from_operations(&ops, media_box(), &FontMap::new());
        assert_eq!(texts(&words), vec!["White", "Black", "Total"]);
        assert!(words.iter().all(|w| w.bbox.x0 == 30.0));
        assert!(words[0].bbox.y0 < words[1].bbox.y0);
        assert!((words[2].bbox.y0 - words[1].bbox.y0 - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_document_words_and_inherited_bound() {
        let bytes = build_pdf(&[(100, 700, "White 10"), (100, 600, "Total 20")], 3);
        let pdf = PdfDocument::from_bytes(&bytes).unwrap();

        assert_eq!(pdf.page_count(), 3);
        assert_eq!(pdf.page_bound(2).unwrap(), Rect::new(0.0, 0.0, 500.0, 800.0));

        let words = pdf.page_words(2).unwrap();
        assert_eq!(texts(&words), vec!["White", "10", "Total", "20"]);
        assert!(pdf.page_words(0).unwrap().is_empty());
        assert!(pdf.page_words(3).is_err());
    }

    #[test]
    fn test_identity_encoded_font_words() {
        let bytes = build_identity_pdf(&[(40, 700, "White 1,234"), (40, 500, "Total 9")]);
        let pdf = PdfDocument::from_bytes(&bytes).unwrap();

        let words = pdf.page_words(0).unwrap();
        assert_eq!(texts(&words), vec!["White", "1,234", "Total", "9"]);

        // White: 5 glyphs at the 600 default width; space is 278; digits 556.
        assert!((words[0].bbox.x1 - 70.0).abs() < 1e-9);
        assert!((words[1].bbox.x0 - 72.78).abs() < 1e-9);

        let region = locate_table_region(&words, pdf.page_bound(0).unwrap(), "White", "Total", 1).unwrap();
        assert_eq!(region.x0, 40.0);
        assert!(region.y0 < region.y1);
    }
}
