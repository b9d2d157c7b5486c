//! PDF decoding into positioned spans.
//!
//! [`PdfDecoder`] is the seam the ingestion pipeline talks to; tests plug in
//! their own implementation. [`LopdfDecoder`] walks each page's content stream
//! with a simplified text-rendering state machine:
//!
//! | Operator | Action |
//! |----------|--------|
//! | `BT`     | Begin text object, reset matrices |
//! | `Tf`     | Set font and size |
//! | `Tm`     | Set text matrix |
//! | `Td` `TD` `T*` `TL` | Line positioning and leading |
//! | `Tc` `Tw` `Tz` `Ts` | Spacing, scaling, rise |
//! | `Tj` `TJ` `'` `"`   | Show text |
//! | `g` `rg` `k` `q` `Q` | Fill colour and its save/restore stack |
//!
//! Glyph metrics are not read; widths are estimated from the character count.

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Document, Encoding, Object, ObjectId};

use crate::error::{IndexingError, Result};
use crate::models::{Rect, Span, StyleFlags};

/// One decoded page. `number` is 0-based.
#[derive(Debug, Clone)]
pub struct DecodedPage {
    pub number: u32,
    pub width: f64,
    pub height: f64,
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, Default)]
pub struct DecodedDocument {
    pub pages: Vec<DecodedPage>,
}

/// Opens a PDF and yields its pages with their spans.
///
/// Implementations report a missing file as [`IndexingError::ArtifactMissing`]
/// and anything unreadable as [`IndexingError::Decode`].
pub trait PdfDecoder: Send + Sync {
    fn open(&self, path: &Path) -> Result<DecodedDocument>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfDecoder;

impl PdfDecoder for LopdfDecoder {
    fn open(&self, path: &Path) -> Result<DecodedDocument> {
        if !path.is_file() {
            return Err(IndexingError::ArtifactMissing(path.display().to_string()));
        }
        let data = std::fs::read(path)?;
        decode_bytes(&data).map_err(|reason| IndexingError::Decode {
            path: path.display().to_string(),
            reason,
        })
    }
}

/// US Letter, used when a page declares no MediaBox anywhere in its tree.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Bound on the Parent chain walked for inherited attributes.
const MAX_TREE_DEPTH: usize = 32;

/// Average glyph advance as a fraction of the font size.
const APPROX_CHAR_WIDTH_RATIO: f64 = 0.5;

pub fn decode_bytes(data: &[u8]) -> std::result::Result<DecodedDocument, String> {
    let doc = Document::load_mem(data).map_err(|e| e.to_string())?;
    if doc.is_encrypted() {
        return Err("document is encrypted".to_string());
    }

    let mut pages = Vec::new();
    for (index, (_, page_id)) in doc.get_pages().into_iter().enumerate() {
        let media_box = media_box(&doc, page_id).unwrap_or(DEFAULT_MEDIA_BOX);
        let fonts = page_fonts(&doc, page_id);
        let raw = doc
            .get_page_content(page_id)
            .map_err(|e| format!("page {}: cannot read content: {}", index, e))?;
        let content = Content::decode(&raw)
            .map_err(|e| format!("page {}: content stream decode error: {}", index, e))?;

        let page = PageGeometry {
            number: index as u32,
            origin_x: media_box[0],
            top_y: media_box[3],
        };
        pages.push(DecodedPage {
            number: index as u32,
            width: (media_box[2] - media_box[0]).abs(),
            height: (media_box[3] - media_box[1]).abs(),
            spans: walk_content(&content.operations, &fonts, &page),
        });
    }

    Ok(DecodedDocument { pages })
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some(*f as f64),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

/// Walk up the page tree to find the MediaBox, normalised to
/// `[llx, lly, urx, ury]`.
fn media_box(doc: &Document, page_id: ObjectId) -> Option<[f64; 4]> {
    let mut dict = doc.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(obj) = dict.get(b"MediaBox") {
            if let Ok(arr) = resolve(doc, obj).as_array() {
                let nums: Vec<f64> = arr.iter().filter_map(|o| number(resolve(doc, o))).collect();
                if nums.len() == 4 {
                    return Some([
                        nums[0].min(nums[2]),
                        nums[1].min(nums[3]),
                        nums[0].max(nums[2]),
                        nums[1].max(nums[3]),
                    ]);
                }
            }
        }
        let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_object(parent).ok()?.as_dict().ok()?;
    }
    None
}

/// A font resource of one page: its key (`F1`), base font name
/// (`Helvetica-Bold`) and the encoding its string operands are written in,
/// when the font declares one lopdf can resolve.
struct PageFont<'a> {
    key: Vec<u8>,
    base: String,
    encoding: Option<Encoding<'a>>,
    /// `Identity-H`/`Identity-V`: two-byte codes, often UCS-2 in practice.
    identity: bool,
}

impl PageFont<'_> {
    fn decode(&self, bytes: &[u8]) -> String {
        if let Some(encoding) = &self.encoding {
            match Document::decode_text(encoding, bytes) {
                Ok(text) => return text,
                Err(e) => log::debug!("font {}: {}; using plain decoding", self.base, e),
            }
        }
        if self.identity {
            if let Some(text) = decode_utf16_be(bytes) {
                return text;
            }
        }
        decode_text_simple(bytes)
    }
}

fn page_fonts(doc: &Document, page_id: ObjectId) -> Vec<PageFont<'_>> {
    let fonts = match doc.get_page_fonts(page_id) {
        Ok(fonts) => fonts,
        Err(e) => {
            log::debug!("no font resources for page {:?}: {}", page_id, e);
            return Vec::new();
        }
    };
    fonts
        .into_iter()
        .map(|(key, dict)| {
            let base = dict
                .get(b"BaseFont")
                .ok()
                .and_then(|o| o.as_name().ok())
                .map(|n| String::from_utf8_lossy(n).into_owned())
                .unwrap_or_else(|| String::from_utf8_lossy(&key).into_owned());
            let named = dict.get(b"Encoding").and_then(Object::as_name).ok();
            let identity = named.is_some_and(|n| n.starts_with(b"Identity"));
            // Otherwise lopdf falls back to StandardEncoding, which would
            // mangle the UTF-8 and UTF-16 strings many producers write.
            let encoding = if named.is_some() || dict.has(b"ToUnicode") {
                match dict.get_font_encoding(doc) {
                    Ok(encoding) => Some(encoding),
                    Err(e) => {
                        log::debug!("font {}: unresolved encoding: {}", base, e);
                        None
                    }
                }
            } else {
                None
            };
            PageFont {
                key,
                base,
                encoding,
                identity,
            }
        })
        .collect()
}

/// Two-byte big-endian codes read as UTF-16. `None` when the result is
/// clearly not text.
fn decode_utf16_be(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() || bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    let text = String::from_utf16_lossy(&units);
    if text.contains('\0') || text.chars().all(|c| c == char::REPLACEMENT_CHARACTER) {
        return None;
    }
    Some(text)
}

/// Best-effort decoding of string operand bytes: UTF-16BE with BOM, then
/// UTF-8, then Latin-1.
pub fn decode_text_simple(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Style bits inferred from a base font name.
pub fn flags_for_font(base_font: &str) -> StyleFlags {
    // Drop a subset tag such as `ABCDEF+`.
    let name = base_font
        .split_once('+')
        .map(|(_, rest)| rest)
        .unwrap_or(base_font)
        .to_uppercase();

    let mut flags = StyleFlags::empty();
    if name.contains("BOLD") || name.contains("BLACK") || name.contains("HEAVY") {
        flags |= StyleFlags::BOLD;
    }
    if name.contains("ITALIC") || name.contains("OBLIQUE") {
        flags |= StyleFlags::ITALIC;
    }
    if name.contains("COURIER") || name.contains("MONO") || name.contains("CONSOL") {
        flags |= StyleFlags::MONOSPACE;
    } else if !name.contains("SANS")
        && (name.contains("TIMES") || name.contains("SERIF") || name.contains("GEORGIA") || name.contains("GARAMOND"))
    {
        flags |= StyleFlags::SERIF;
    }
    flags
}

struct PageGeometry {
    number: u32,
    origin_x: f64,
    /// Upper edge of the MediaBox in PDF space; y is flipped against it.
    top_y: f64,
}

const IDENTITY: [f64; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

#[derive(Clone)]
struct TextState {
    /// Index into the page's fonts of the font selected by `Tf`.
    font: Option<usize>,
    font_name: String,
    flags: StyleFlags,
    font_size: f64,
    text_matrix: [f64; 6],
    line_matrix: [f64; 6],
    horiz_scale: f64,
    char_spacing: f64,
    word_spacing: f64,
    text_rise: f64,
    leading: f64,
    color: u32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: None,
            font_name: String::new(),
            flags: StyleFlags::empty(),
            font_size: 0.0,
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            horiz_scale: 1.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            text_rise: 0.0,
            leading: 0.0,
            color: 0,
        }
    }
}

impl TextState {
    /// `font_size * sqrt(b^2 + d^2)` of the text matrix.
    fn effective_font_size(&self) -> f64 {
        let scale = (self.text_matrix[1].powi(2) + self.text_matrix[3].powi(2)).sqrt();
        (self.font_size * scale).abs()
    }

    fn horizontal_scale(&self) -> f64 {
        (self.text_matrix[0].powi(2) + self.text_matrix[1].powi(2)).sqrt()
    }

    fn advance_x(&mut self, dx: f64) {
        self.text_matrix[4] += dx * self.text_matrix[0];
        self.text_matrix[5] += dx * self.text_matrix[1];
    }

    fn translate_line(&mut self, tx: f64, ty: f64) {
        let m = self.line_matrix;
        self.line_matrix[4] = m[0] * tx + m[2] * ty + m[4];
        self.line_matrix[5] = m[1] * tx + m[3] * ty + m[5];
        self.text_matrix = self.line_matrix;
    }

    fn glyph_advance(&self) -> f64 {
        self.font_size * APPROX_CHAR_WIDTH_RATIO * self.horiz_scale
    }

    fn advance_after_show(&mut self, text: &str) {
        let mut dx = 0.0;
        for ch in text.chars() {
            dx += self.glyph_advance() + self.char_spacing;
            if ch == ' ' {
                dx += self.word_spacing;
            }
        }
        self.advance_x(dx);
    }
}

fn operand(op: &Operation, i: usize) -> Option<f64> {
    op.operands.get(i).and_then(number)
}

fn pack_rgb(r: f64, g: f64, b: f64) -> u32 {
    let c = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
    (c(r) << 16) | (c(g) << 8) | c(b)
}

fn set_font(op: &Operation, fonts: &[PageFont<'_>], state: &mut TextState) {
    let key = match op.operands.first() {
        Some(Object::Name(n)) => n.clone(),
        _ => return,
    };
    state.font = fonts.iter().position(|f| f.key == key);
    let base = match state.font {
        Some(i) => fonts[i].base.clone(),
        None => String::from_utf8_lossy(&key).into_owned(),
    };
    state.font_size = operand(op, 1).unwrap_or(0.0);
    state.flags = flags_for_font(&base);
    state.font_name = base;
}

/// Decode a string operand with the current font's encoding.
fn decode_operand(bytes: &[u8], fonts: &[PageFont<'_>], state: &TextState) -> String {
    match state.font.and_then(|i| fonts.get(i)) {
        Some(font) => font.decode(bytes),
        None => decode_text_simple(bytes),
    }
}

/// Run the state machine over one page's operations.
fn walk_content(ops: &[Operation], fonts: &[PageFont<'_>], page: &PageGeometry) -> Vec<Span> {
    let mut state = TextState::default();
    let mut saved: Vec<u32> = Vec::new();
    let mut spans = Vec::new();

    for op in ops {
        match op.operator.as_str() {
            "BT" => {
                state.text_matrix = IDENTITY;
                state.line_matrix = IDENTITY;
            }
            "q" => saved.push(state.color),
            "Q" => {
                if let Some(color) = saved.pop() {
                    state.color = color;
                }
            }
            "g" => {
                if let Some(v) = operand(op, 0) {
                    state.color = pack_rgb(v, v, v);
                }
            }
            "rg" => {
                if let (Some(r), Some(g), Some(b)) = (operand(op, 0), operand(op, 1), operand(op, 2)) {
                    state.color = pack_rgb(r, g, b);
                }
            }
            "k" => {
                if let (Some(c), Some(m), Some(y), Some(k)) =
                    (operand(op, 0), operand(op, 1), operand(op, 2), operand(op, 3))
                {
                    state.color = pack_rgb((1.0 - c) * (1.0 - k), (1.0 - m) * (1.0 - k), (1.0 - y) * (1.0 - k));
                }
            }
            "Tf" => set_font(op, fonts, &mut state),
            "Tm" => {
                let vals: Vec<f64> = op.operands.iter().take(6).filter_map(number).collect();
                if vals.len() == 6 {
                    state.text_matrix = [vals[0], vals[1], vals[2], vals[3], vals[4], vals[5]];
                    state.line_matrix = state.text_matrix;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (operand(op, 0), operand(op, 1)) {
                    state.translate_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (operand(op, 0), operand(op, 1)) {
                    state.leading = -ty;
                    state.translate_line(tx, ty);
                }
            }
            "T*" => state.translate_line(0.0, -state.leading),
            "TL" => {
                if let Some(v) = operand(op, 0) {
                    state.leading = v;
                }
            }
            "Tc" => {
                if let Some(v) = operand(op, 0) {
                    state.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some(v) = operand(op, 0) {
                    state.word_spacing = v;
                }
            }
            "Tz" => {
                if let Some(v) = operand(op, 0) {
                    state.horiz_scale = v / 100.0;
                }
            }
            "Ts" => {
                if let Some(v) = operand(op, 0) {
                    state.text_rise = v;
                }
            }
            "Tj" => {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    show_string(&decode_operand(bytes, fonts, &state), &mut state, page, &mut spans);
                }
            }
            "'" => {
                state.translate_line(0.0, -state.leading);
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    show_string(&decode_operand(bytes, fonts, &state), &mut state, page, &mut spans);
                }
            }
            "\"" => {
                if let Some(aw) = operand(op, 0) {
                    state.word_spacing = aw;
                }
                if let Some(ac) = operand(op, 1) {
                    state.char_spacing = ac;
                }
                state.translate_line(0.0, -state.leading);
                if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                    show_string(&decode_operand(bytes, fonts, &state), &mut state, page, &mut spans);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    show_array(items, fonts, &mut state, page, &mut spans);
                }
            }
            _ => {}
        }
    }

    spans
}

fn show_string(text: &str, state: &mut TextState, page: &PageGeometry, spans: &mut Vec<Span>) {
    let x = state.text_matrix[4];
    let y = state.text_matrix[5];
    push_span(text, x, y, state, page, spans);
    state.advance_after_show(text);
}

/// `TJ`: strings interleaved with kerning adjustments in thousandths of a
/// text-space unit. Large negative adjustments read as word gaps.
fn show_array(
    items: &[Object],
    fonts: &[PageFont<'_>],
    state: &mut TextState,
    page: &PageGeometry,
    spans: &mut Vec<Span>,
) {
    let mut buf = String::new();
    let mut start = (state.text_matrix[4], state.text_matrix[5]);

    for item in items {
        match item {
            Object::String(bytes, _) => {
                let fragment = decode_operand(bytes, fonts, state);
                if buf.is_empty() {
                    start = (state.text_matrix[4], state.text_matrix[5]);
                }
                buf.push_str(&fragment);
                state.advance_after_show(&fragment);
            }
            other => {
                if let Some(adj) = number(other) {
                    let dx = -adj / 1000.0 * state.font_size * state.horiz_scale;
                    if dx > state.glyph_advance() * 0.3 && !buf.is_empty() && !buf.ends_with(' ') {
                        buf.push(' ');
                    }
                    state.advance_x(dx);
                }
            }
        }
    }

    push_span(&buf, start.0, start.1, state, page, spans);
}

fn push_span(text: &str, x: f64, y: f64, state: &TextState, page: &PageGeometry, spans: &mut Vec<Span>) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    let size = state.effective_font_size();
    let width = text.chars().count() as f64 * state.glyph_advance() * state.horizontal_scale();
    let baseline = y + state.text_rise;

    let mut flags = state.flags;
    if state.text_rise > 0.0 {
        flags |= StyleFlags::SUPERSCRIPT;
    }

    let left = x - page.origin_x;
    spans.push(Span {
        font: state.font_name.clone(),
        flags,
        size,
        color: state.color,
        text: text.to_string(),
        bbox: Rect::new(left, page.top_y - (baseline + size), left + width, page.top_y - baseline),
        page: page.number,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Dictionary, Stream, StringFormat};

    /// Build a one-page PDF whose content stream is `ops`, with `F1` a
    /// Type1 font named `base_font`.
    fn pdf_with_ops(ops: Vec<Operation>, base_font: &str) -> Vec<u8> {
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => Object::Name(base_font.as_bytes().to_vec()),
        };
        pdf_with_font(ops, |_| font)
    }

    /// Like [`pdf_with_ops`], with `F1` built by `font` so it can add its
    /// own objects (a ToUnicode stream) to the document.
    fn pdf_with_font(ops: Vec<Operation>, font: impl FnOnce(&mut Document) -> Dictionary) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_dict = font(&mut doc);
        let font_id = doc.add_object(font_dict);
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content { operations: ops };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 600.into(), 800.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn show_bytes(bytes: Vec<u8>, format: StringFormat) -> Vec<Operation> {
        vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("Td", vec![100.into(), 700.into()]),
            Operation::new("Tj", vec![Object::String(bytes, format)]),
            Operation::new("ET", vec![]),
        ]
    }

    const GLYPH_CMAP: &str = "/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CIDSystemInfo
<< /Registry (Adobe)
/Ordering (UCS)
/Supplement 0
>> def
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
7 beginbfchar
<0001> <0048>
<0002> <0069>
<0003> <0020>
<0004> <0074>
<0005> <0068>
<0006> <0065>
<0007> <0072>
endbfchar
endcmap
CMapName currentdict /CMap defineresource pop
end
end
";

    fn show(text: &str, x: i64, y: i64) -> Vec<Operation> {
        vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ]
    }

    #[test]
    fn spans_are_positioned_from_the_top() {
        let data = pdf_with_ops(show("Hello", 100, 700), "Helvetica");
        let doc = decode_bytes(&data).unwrap();
        assert_eq!(doc.pages.len(), 1);
        let page = &doc.pages[0];
        assert_eq!(page.number, 0);
        assert_eq!(page.width, 600.0);
        assert_eq!(page.height, 800.0);
        assert_eq!(page.spans.len(), 1);

        let span = &page.spans[0];
        assert_eq!(span.text, "Hello");
        assert_eq!(span.font, "Helvetica");
        assert_eq!(span.size, 10.0);
        assert_eq!(span.bbox, Rect::new(100.0, 90.0, 125.0, 100.0));
    }

    #[test]
    fn tj_array_gaps_become_spaces() {
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("Td", vec![10.into(), 10.into()]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    Object::string_literal("Hello"),
                    Object::Integer(-400),
                    Object::string_literal("World"),
                ])],
            ),
            Operation::new("ET", vec![]),
        ];
        let doc = decode_bytes(&pdf_with_ops(ops, "Times-BoldItalic")).unwrap();
        let span = &doc.pages[0].spans[0];
        assert_eq!(span.text, "Hello World");
        assert!(span.flags.contains(StyleFlags::BOLD | StyleFlags::ITALIC | StyleFlags::SERIF));
    }

    #[test]
    fn fill_colour_is_tracked() {
        let mut ops = vec![Operation::new("rg", vec![1.into(), 0.into(), 0.into()])];
        ops.extend(show("red", 0, 0));
        let doc = decode_bytes(&pdf_with_ops(ops, "Helvetica")).unwrap();
        assert_eq!(doc.pages[0].spans[0].color, 0xFF0000);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(decode_bytes(b"definitely not a pdf").is_err());
    }

    #[test]
    fn missing_file_is_reported_as_missing() {
        let err = LopdfDecoder.open(Path::new("/nonexistent/nowhere.pdf")).unwrap_err();
        assert!(matches!(err, IndexingError::ArtifactMissing(_)));
    }

    #[test]
    fn font_name_flags() {
        assert_eq!(flags_for_font("ABCDEF+Arial-BoldMT"), StyleFlags::BOLD);
        assert_eq!(flags_for_font("Courier-Oblique"), StyleFlags::MONOSPACE | StyleFlags::ITALIC);
        assert_eq!(flags_for_font("DejaVuSans"), StyleFlags::empty());
        assert_eq!(flags_for_font("DejaVuSerif"), StyleFlags::SERIF);
    }

    #[test]
    fn utf16_strings_decode() {
        assert_eq!(decode_text_simple(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0xE9]), "Aé");
        assert_eq!(decode_text_simple(&[0x63, 0x61, 0x66, 0xE9]), "café");
    }

    #[test]
    fn to_unicode_cmap_maps_glyph_codes() {
        // "Hi there" as two-byte glyph ids.
        let codes: Vec<u8> = [1u8, 2, 3, 4, 5, 6, 7, 6]
            .iter()
            .flat_map(|&c| [0, c])
            .collect();
        let data = pdf_with_font(show_bytes(codes, StringFormat::Hexadecimal), |doc| {
            let cmap = GLYPH_CMAP.as_bytes().to_vec();
            let to_unicode = doc.add_object(Stream::new(
                dictionary! { "Length" => cmap.len() as i64 },
                cmap,
            ));
            dictionary! {
                "Type" => "Font",
                "Subtype" => "Type0",
                "BaseFont" => "ABCDEF+Georgia",
                "Encoding" => "Identity-H",
                "ToUnicode" => Object::Reference(to_unicode),
            }
        });

        let doc = decode_bytes(&data).unwrap();
        let span = &doc.pages[0].spans[0];
        assert_eq!(span.text, "Hi there");
        assert_eq!(span.font, "ABCDEF+Georgia");
        assert_eq!(span.bbox, Rect::new(100.0, 90.0, 140.0, 100.0));
    }

    #[test]
    fn named_encoding_is_applied() {
        let data = pdf_with_font(show_bytes(vec![0x80, b'1', b'0'], StringFormat::Literal), |_| {
            dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            }
        });
        let doc = decode_bytes(&data).unwrap();
        assert_eq!(doc.pages[0].spans[0].text, "\u{20AC}10");
    }

    #[test]
    fn identity_font_without_cmap_reads_utf16() {
        let data = pdf_with_font(
            show_bytes(vec![0x00, 0x48, 0x00, 0x69], StringFormat::Hexadecimal),
            |_| {
                dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type0",
                    "BaseFont" => "NotoSans",
                    "Encoding" => "Identity-H",
                }
            },
        );
        let doc = decode_bytes(&data).unwrap();
        assert_eq!(doc.pages[0].spans[0].text, "Hi");
    }

    #[test]
    fn utf16_heuristic_rejects_non_text() {
        assert_eq!(decode_utf16_be(&[0x00, 0x41]), Some("A".to_string()));
        assert_eq!(decode_utf16_be(&[0x00, 0x00]), None);
        assert_eq!(decode_utf16_be(&[0x41]), None);
        assert_eq!(decode_utf16_be(&[0xD8, 0x00]), None);
    }
}
