//! PDF extraction behind two seams: a primary text extractor (one entry per
//! page) and a structural extractor (tables and images). The
//! [`ExtractionAdapter`] runs the three extractions independently so one
//! failing kind never hides the others. All three read one parsed
//! [`PdfFile`].

use crate::error::IngestError;
use crate::models::{BlockKind, ExtractedBlock};
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use regex::Regex;
use std::cell::OnceCell;
use std::path::Path;
use tracing::{debug, warn};

/// Baselines closer than this (in text space units) share a row.
const ROW_TOLERANCE: f32 = 2.0;
/// Runs starting this close together on one row are the same cell.
const CELL_TOLERANCE: f32 = 1.0;
const MAX_PAGE_TREE_DEPTH: usize = 32;

/// A PDF on disk, parsed at most once however many extractors read it.
pub struct PdfFile<'a> {
    path: &'a Path,
    document: OnceCell<Result<Document, String>>,
}

impl<'a> PdfFile<'a> {
    pub fn new(path: &'a Path) -> Self {
        Self {
            path,
            document: OnceCell::new(),
        }
    }

    pub fn document(&self) -> Result<&Document, IngestError> {
        self.document
            .get_or_init(|| Document::load(self.path).map_err(|error| error.to_string()))
            .as_ref()
            .map_err(|message| IngestError::PdfParse(message.clone()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Blocks from a structural pass plus the per-page problems it stepped over.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StructureBlocks {
    pub blocks: Vec<ExtractedBlock>,
    pub diagnostics: Vec<String>,
}

impl From<Vec<ExtractedBlock>> for StructureBlocks {
    fn from(blocks: Vec<ExtractedBlock>) -> Self {
        Self {
            blocks,
            diagnostics: Vec::new(),
        }
    }
}

pub trait TextExtractor {
    fn extract_pages(&self, pdf: &PdfFile<'_>) -> Result<Vec<PageText>, IngestError>;
}

/// A whole-file `Err` means the pass produced nothing; trouble confined to
/// one page belongs in [`StructureBlocks::diagnostics`].
pub trait StructureExtractor {
    fn extract_tables(&self, pdf: &PdfFile<'_>) -> Result<StructureBlocks, IngestError>;
    fn extract_images(&self, pdf: &PdfFile<'_>) -> Result<StructureBlocks, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfTextExtractor;

impl TextExtractor for LopdfTextExtractor {
    fn extract_pages(&self, pdf: &PdfFile<'_>) -> Result<Vec<PageText>, IngestError> {
        let document = pdf.document()?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;

            // blank pages are kept so numbering stays aligned with the file
            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        Ok(pages)
    }
}

/// A string shown at a position in text space.
#[derive(Debug, Clone, PartialEq)]
struct TextRun {
    x: f32,
    y: f32,
    text: String,
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

fn decode_pdf_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
            char::decode_utf16(units)
                .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
        _ => bytes.iter().map(|&byte| byte as char).collect(),
    }
}

fn shown_text(operation: &Operation) -> String {
    let shown = match operation.operator.as_str() {
        "Tj" | "TJ" | "'" => operation.operands.first(),
        "\"" => operation.operands.get(2),
        _ => None,
    };

    match shown {
        Some(Object::String(bytes, _)) => decode_pdf_string(bytes),
        Some(Object::Array(parts)) => {
            let mut text = String::new();
            for part in parts {
                match part {
                    Object::String(bytes, _) => text.push_str(&decode_pdf_string(bytes)),
                    // a wide negative adjustment is how TJ writes a word gap
                    other if number(other).is_some_and(|gap| gap <= -200.0) => text.push(' '),
                    _ => {}
                }
            }
            text
        }
        _ => String::new(),
    }
}

/// Follows the text positioning operators and records where each string is
/// shown. Positions ignore scaling in the text matrix.
fn text_runs(content: &Content) -> Vec<TextRun> {
    let mut runs = Vec::new();
    let (mut x, mut y, mut leading) = (0.0f32, 0.0f32, 0.0f32);

    for operation in &content.operations {
        let operand = |index: usize| operation.operands.get(index).and_then(number);

        match operation.operator.as_str() {
            "BT" => {
                x = 0.0;
                y = 0.0;
            }
            "Td" | "TD" => {
                if let (Some(tx), Some(ty)) = (operand(0), operand(1)) {
                    x += tx;
                    y += ty;
                    if operation.operator == "TD" {
                        leading = -ty;
                    }
                }
            }
            "Tm" => {
                if let (Some(e), Some(f)) = (operand(4), operand(5)) {
                    x = e;
                    y = f;
                }
            }
            "TL" => {
                if let Some(value) = operand(0) {
                    leading = value;
                }
            }
            "T*" => y -= leading,
            "Tj" | "TJ" | "'" | "\"" => {
                if matches!(operation.operator.as_str(), "'" | "\"") {
                    y -= leading;
                }
                let text = shown_text(operation);
                if !text.trim().is_empty() {
                    runs.push(TextRun { x, y, text });
                }
            }
            _ => {}
        }
    }

    runs
}

/// The page's resource dictionary, inherited through the page tree when the
/// page carries none of its own.
fn page_resources(document: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = document.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            return document.dereference(resources).ok()?.1.as_dict().ok();
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = document.get_dictionary(parent).ok()?;
    }
    None
}

fn stream_filters(dict: &Dictionary) -> Vec<String> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![String::from_utf8_lossy(name).into_owned()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().ok())
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect(),
        _ => Vec::new(),
    }
}

fn image_mime_type(filters: &[String]) -> &'static str {
    if filters.iter().any(|filter| filter == "DCTDecode") {
        "image/jpeg"
    } else if filters.iter().any(|filter| filter == "JPXDecode") {
        "image/jp2"
    } else {
        "application/octet-stream"
    }
}

fn page_images(
    document: &Document,
    page_no: u32,
    page_id: ObjectId,
) -> lopdf::Result<Vec<ExtractedBlock>> {
    let Some(resources) = page_resources(document, page_id) else {
        return Ok(Vec::new());
    };
    let xobjects = match resources.get(b"XObject") {
        Ok(object) => document.dereference(object)?.1.as_dict()?,
        Err(_) => return Ok(Vec::new()),
    };

    let mut images = Vec::new();
    for (_name, object) in xobjects.iter() {
        let stream = document.dereference(object)?.1.as_stream()?;
        let is_image = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .is_ok_and(|subtype| subtype == b"Image");
        if !is_image {
            continue;
        }

        images.push(ExtractedBlock::Image {
            page: page_no,
            base64: (!stream.content.is_empty()).then(|| STANDARD.encode(&stream.content)),
            mime_type: image_mime_type(&stream_filters(&stream.dict)).to_string(),
        });
    }

    Ok(images)
}

/// Finds tables from where text is placed on the page, and image streams in
/// page resources.
#[derive(Debug, Clone)]
pub struct LopdfStructureExtractor {
    cell_gap: Regex,
}

impl LopdfStructureExtractor {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            cell_gap: Regex::new(r"\t+| {2,}")?,
        })
    }

    /// A single run padded with tabs or wide spaces still holds several cells.
    fn split_cells(&self, text: &str) -> Vec<String> {
        self.cell_gap
            .split(text.trim())
            .map(|cell| cell.trim().to_string())
            .filter(|cell| !cell.is_empty())
            .collect()
    }

    fn row_cells(&self, mut runs: Vec<TextRun>) -> Vec<String> {
        runs.sort_by(|left, right| left.x.total_cmp(&right.x));

        let mut cells: Vec<(f32, String)> = Vec::new();
        for run in runs {
            let same_cell = cells
                .last()
                .is_some_and(|(x, _)| (run.x - x).abs() <= CELL_TOLERANCE);
            if !same_cell {
                cells.push((run.x, run.text));
            } else if let Some((_, text)) = cells.last_mut() {
                text.push_str(&run.text);
            }
        }

        cells
            .iter()
            .flat_map(|(_, text)| self.split_cells(text))
            .collect()
    }

    /// Rows of cells, top of the page first.
    fn rows(&self, mut runs: Vec<TextRun>) -> Vec<Vec<String>> {
        runs.sort_by(|above, below| below.y.total_cmp(&above.y));

        let mut rows = Vec::new();
        let mut current: Vec<TextRun> = Vec::new();
        for run in runs {
            let same_row = current
                .first()
                .map_or(true, |first| (first.y - run.y).abs() <= ROW_TOLERANCE);
            if !same_row {
                rows.push(self.row_cells(std::mem::take(&mut current)));
            }
            current.push(run);
        }
        if !current.is_empty() {
            rows.push(self.row_cells(current));
        }

        rows
    }

    /// Runs of two or more consecutive multi-cell rows form one table.
    fn detect_tables(&self, page: u32, rows: &[Vec<String>]) -> Vec<ExtractedBlock> {
        let mut tables = Vec::new();
        let mut run: Vec<&Vec<String>> = Vec::new();
        let sentinel = Vec::new();

        for row in rows.iter().chain(std::iter::once(&sentinel)) {
            if row.len() >= 2 {
                run.push(row);
                continue;
            }

            if run.len() >= 2 {
                tables.push(ExtractedBlock::Table {
                    page,
                    html: render_table(&run),
                });
            }
            run.clear();
        }

        tables
    }

    fn page_tables(
        &self,
        document: &Document,
        page_no: u32,
        page_id: ObjectId,
    ) -> lopdf::Result<Vec<ExtractedBlock>> {
        let content = Content::decode(&document.get_page_content(page_id)?)?;
        Ok(self.detect_tables(page_no, &self.rows(text_runs(&content))))
    }
}

/// `None` when rows disagree on their column count.
fn render_table(rows: &[&Vec<String>]) -> Option<String> {
    let columns = rows.first()?.len();
    if rows.iter().any(|row| row.len() != columns) {
        return None;
    }

    let mut html = String::from("<table>");
    for row in rows {
        html.push_str("<tr>");
        for cell in row.iter() {
            html.push_str("<td>");
            html.push_str(&escape_html(cell));
            html.push_str("</td>");
        }
        html.push_str("</tr>");
    }
    html.push_str("</table>");
    Some(html)
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

impl StructureExtractor for LopdfStructureExtractor {
    fn extract_tables(&self, pdf: &PdfFile<'_>) -> Result<StructureBlocks, IngestError> {
        let document = pdf.document()?;

        let mut found = StructureBlocks::default();
        for (page_no, page_id) in document.get_pages() {
            match self.page_tables(document, page_no, page_id) {
                Ok(tables) => found.blocks.extend(tables),
                Err(error) => {
                    warn!(page = page_no, %error, "cannot read page content for tables");
                    found
                        .diagnostics
                        .push(format!("Error processing tables on page {page_no}: {error}"));
                }
            }
        }

        Ok(found)
    }

    fn extract_images(&self, pdf: &PdfFile<'_>) -> Result<StructureBlocks, IngestError> {
        let document = pdf.document()?;

        let mut found = StructureBlocks::default();
        for (page_no, page_id) in document.get_pages() {
            match page_images(document, page_no, page_id) {
                Ok(images) => found.blocks.extend(images),
                Err(error) => {
                    warn!(page = page_no, %error, "failed to list page images");
                    found
                        .diagnostics
                        .push(format!("Error processing images on page {page_no}: {error}"));
                }
            }
        }

        Ok(found)
    }
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub pages: Vec<PageText>,
    pub tables: Vec<ExtractedBlock>,
    pub images: Vec<ExtractedBlock>,
    pub diagnostics: Vec<String>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty() && self.tables.is_empty() && self.images.is_empty()
    }

    fn absorb(&mut self, found: StructureBlocks) {
        // each page problem was logged where it happened
        self.diagnostics.extend(found.diagnostics);
        for block in found.blocks {
            match block.kind() {
                BlockKind::Table => self.tables.push(block),
                BlockKind::Image => self.images.push(block),
                BlockKind::Text => {
                    debug!(page = block.page(), "structural extractor returned text; ignored");
                }
            }
        }
    }
}

pub struct ExtractionAdapter<T, S> {
    text: T,
    structure: S,
}

impl ExtractionAdapter<LopdfTextExtractor, LopdfStructureExtractor> {
    pub fn lopdf() -> Result<Self, IngestError> {
        Ok(Self::new(LopdfTextExtractor, LopdfStructureExtractor::new()?))
    }
}

impl<T, S> ExtractionAdapter<T, S>
where
    T: TextExtractor,
    S: StructureExtractor,
{
    pub fn new(text: T, structure: S) -> Self {
        Self { text, structure }
    }

    /// Never fails: an extractor error becomes an empty result plus a
    /// diagnostic for that extraction kind.
    pub fn extract(&self, path: &Path) -> Extraction {
        let mut extraction = Extraction::default();
        let file = path.display().to_string();
        let pdf = PdfFile::new(path);

        match self.text.extract_pages(&pdf) {
            Ok(pages) => extraction.pages = pages,
            Err(error) => {
                warn!(file = %file, %error, "text extraction failed");
                extraction
                    .diagnostics
                    .push(format!("Error extracting text from {file}: {error}"));
            }
        }

        match self.structure.extract_tables(&pdf) {
            Ok(found) => extraction.absorb(found),
            Err(error) => {
                warn!(file = %file, %error, "table extraction failed");
                extraction
                    .diagnostics
                    .push(format!("Error extracting tables from {file}: {error}"));
            }
        }

        match self.structure.extract_images(&pdf) {
            Ok(found) => extraction.absorb(found),
            Err(error) => {
                warn!(file = %file, %error, "image extraction failed");
                extraction
                    .diagnostics
                    .push(format!("Error extracting images from {file}: {error}"));
            }
        }

        extraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    const JPEG_BYTES: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xD9];

    struct FailingText;

    impl TextExtractor for FailingText {
        fn extract_pages(&self, _pdf: &PdfFile<'_>) -> Result<Vec<PageText>, IngestError> {
            Err(IngestError::PdfParse("no text layer".to_string()))
        }
    }

    struct FixedStructure {
        fail_tables: bool,
    }

    impl StructureExtractor for FixedStructure {
        fn extract_tables(&self, _pdf: &PdfFile<'_>) -> Result<StructureBlocks, IngestError> {
            if self.fail_tables {
                return Err(IngestError::PdfParse("table model crashed".to_string()));
            }
            Ok(vec![ExtractedBlock::Table {
                page: 1,
                html: Some("<table></table>".to_string()),
            }]
            .into())
        }

        fn extract_images(&self, _pdf: &PdfFile<'_>) -> Result<StructureBlocks, IngestError> {
            Ok(StructureBlocks {
                blocks: vec![
                    ExtractedBlock::Image {
                        page: 2,
                        base64: Some("aGVsbG8=".to_string()),
                        mime_type: "image/jpeg".to_string(),
                    },
                    ExtractedBlock::Text {
                        page: 2,
                        text: "stray".to_string(),
                    },
                ],
                diagnostics: vec!["Error processing images on page 3: bad xobject".to_string()],
            })
        }
    }

    fn run(x: f32, y: f32, text: &str) -> TextRun {
        TextRun {
            x,
            y,
            text: text.to_string(),
        }
    }

    fn show_at(tx: i64, ty: i64, text: &str) -> [Operation; 2] {
        [
            Operation::new("Td", vec![tx.into(), ty.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
        ]
    }

    /// Two pages: a torque table drawn one cell at a time plus a JPEG on page
    /// 1, and an empty page 2 that inherits its resources.
    fn write_fixture(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            JPEG_BYTES.to_vec(),
        ));

        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
        ];
        operations.extend(show_at(72, 700, "Size"));
        operations.extend(show_at(100, 0, "Torque"));
        operations.extend(show_at(-100, -20, "M6"));
        operations.extend(show_at(100, 0, "10 Nm"));
        operations.extend(show_at(-100, -20, "M8"));
        operations.extend(show_at(100, 0, "25 Nm"));
        operations.extend(show_at(-100, -40, "Values apply to dry threads."));
        operations.push(Operation::new("ET", vec![]));
        let table_content = Content { operations }.encode()?;

        let first_page = doc.add_object(Stream::new(dictionary! {}, table_content));
        let first_page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => first_page,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => dictionary! { "Im1" => image_id },
            },
        });
        let blank_page = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let blank_page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => blank_page,
        });

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![first_page_id.into(), blank_page_id.into()],
                "Count" => 2,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path)?;
        Ok(())
    }

    const TORQUE_TABLE: &str = "<table><tr><td>Size</td><td>Torque</td></tr><tr><td>M6</td><td>10 Nm</td></tr><tr><td>M8</td><td>25 Nm</td></tr></table>";

    #[test]
    fn text_failure_still_yields_tables_and_images() {
        let adapter = ExtractionAdapter::new(FailingText, FixedStructure { fail_tables: false });
        let extraction = adapter.extract(Path::new("x.pdf"));

        assert!(extraction.pages.is_empty());
        assert_eq!(extraction.tables.len(), 1);
        assert_eq!(extraction.images.len(), 1);
        assert!(extraction.diagnostics[0].contains("no text layer"));
    }

    #[test]
    fn table_failure_keeps_images() {
        let adapter = ExtractionAdapter::new(FailingText, FixedStructure { fail_tables: true });
        let extraction = adapter.extract(Path::new("x.pdf"));

        assert!(extraction.tables.is_empty());
        assert_eq!(extraction.images.len(), 1);
        assert_eq!(extraction.diagnostics.len(), 3);
    }

    #[test]
    fn page_level_problems_reach_the_diagnostics() {
        let adapter = ExtractionAdapter::new(FailingText, FixedStructure { fail_tables: false });
        let extraction = adapter.extract(Path::new("x.pdf"));

        assert!(extraction
            .diagnostics
            .contains(&"Error processing images on page 3: bad xobject".to_string()));
    }

    #[test]
    fn cells_placed_side_by_side_become_an_html_table() -> Result<(), IngestError> {
        let extractor = LopdfStructureExtractor::new()?;
        let runs = vec![
            run(72.0, 720.0, "Intro paragraph"),
            run(72.0, 700.0, "Size"),
            run(172.0, 700.0, "Torque"),
            run(172.0, 680.5, "10 Nm"),
            run(72.0, 680.0, "M6"),
            run(72.0, 660.0, "M8"),
            run(172.0, 660.0, "25 Nm"),
            run(72.0, 620.0, "Closing words"),
        ];

        let tables = extractor.detect_tables(4, &extractor.rows(runs));
        assert_eq!(
            tables,
            vec![ExtractedBlock::Table {
                page: 4,
                html: Some(TORQUE_TABLE.to_string()),
            }]
        );
        Ok(())
    }

    #[test]
    fn wide_gaps_inside_one_string_split_cells() -> Result<(), IngestError> {
        let extractor = LopdfStructureExtractor::new()?;
        let runs = vec![
            run(72.0, 700.0, "Size  Torque"),
            run(72.0, 680.0, "M6\t10 Nm"),
        ];

        let tables = extractor.detect_tables(1, &extractor.rows(runs));
        assert_eq!(tables.len(), 1);
        assert!(matches!(&tables[0], ExtractedBlock::Table { html: Some(_), .. }));
        Ok(())
    }

    #[test]
    fn ragged_table_has_no_rendered_form() -> Result<(), IngestError> {
        let extractor = LopdfStructureExtractor::new()?;
        let rows = vec![
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            vec!["d".to_string(), "e".to_string()],
        ];
        assert_eq!(
            extractor.detect_tables(1, &rows),
            vec![ExtractedBlock::Table { page: 1, html: None }]
        );
        Ok(())
    }

    #[test]
    fn single_multi_cell_row_is_not_a_table() -> Result<(), IngestError> {
        let extractor = LopdfStructureExtractor::new()?;
        let runs = vec![
            run(72.0, 700.0, "Name"),
            run(200.0, 700.0, "Value"),
            run(72.0, 680.0, "plain text"),
        ];
        assert!(extractor.detect_tables(1, &extractor.rows(runs)).is_empty());
        Ok(())
    }

    #[test]
    fn cells_are_html_escaped() {
        let header = vec!["a<b".to_string(), "x & y".to_string()];
        let body = vec!["1".to_string(), "2".to_string()];
        let html = render_table(&[&header, &body]).unwrap();
        assert!(html.contains("<td>a&lt;b</td><td>x &amp; y</td>"));
    }

    #[test]
    fn positioning_operators_place_each_string() {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tm", vec![1.into(), 0.into(), 0.into(), 1.into(), 50.into(), 500.into()]),
                Operation::new("TL", vec![14.into()]),
                Operation::new("Tj", vec![Object::string_literal("first")]),
                Operation::new("T*", vec![]),
                Operation::new(
                    "TJ",
                    vec![Object::Array(vec![
                        Object::string_literal("sec"),
                        Object::Integer(-20),
                        Object::string_literal("ond"),
                        Object::Integer(-300),
                        Object::string_literal("line"),
                    ])],
                ),
                Operation::new("ET", vec![]),
            ],
        };

        assert_eq!(
            text_runs(&content),
            vec![run(50.0, 500.0, "first"), run(50.0, 486.0, "second line")]
        );
    }

    #[test]
    fn lopdf_extractors_read_a_real_document() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("torque.pdf");
        write_fixture(&path)?;
        let pdf = PdfFile::new(&path);

        let pages = LopdfTextExtractor.extract_pages(&pdf)?;
        let numbers: Vec<u32> = pages.iter().map(|page| page.number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert!(pages[0].text.contains("Torque"));
        assert!(pages[1].text.trim().is_empty());

        let structure = LopdfStructureExtractor::new()?;
        let tables = structure.extract_tables(&pdf)?;
        assert_eq!(
            tables,
            StructureBlocks::from(vec![ExtractedBlock::Table {
                page: 1,
                html: Some(TORQUE_TABLE.to_string()),
            }])
        );

        let images = structure.extract_images(&pdf)?;
        assert_eq!(
            images,
            StructureBlocks::from(vec![ExtractedBlock::Image {
                page: 1,
                base64: Some(STANDARD.encode(JPEG_BYTES)),
                mime_type: "image/jpeg".to_string(),
            }])
        );
        Ok(())
    }

    #[test]
    fn adapter_over_lopdf_collects_every_kind() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("torque.pdf");
        write_fixture(&path)?;

        let extraction = ExtractionAdapter::lopdf()?.extract(&path);
        assert_eq!(extraction.pages.len(), 2);
        assert_eq!(extraction.tables.len(), 1);
        assert_eq!(extraction.images.len(), 1);
        assert!(extraction.diagnostics.is_empty());
        Ok(())
    }

    #[test]
    fn unreadable_pdf_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = LopdfTextExtractor.extract_pages(&PdfFile::new(&path));
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        Ok(())
    }
}
