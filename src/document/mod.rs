//! Document assembly
//!
//! Turns a title, formatted OCR text and (optionally) the source image into a
//! downloadable file. Each output format has a [`DocumentWriter`]; the
//! [`DocumentAssembler`] picks one, prepares the shared content and names the
//! result.

pub mod docx;
pub mod text;

use crate::error::ConvertError;
use crate::formatting::FormattedText;
use crate::request::sanitize_title;
use chrono::{DateTime, Local};
use image::ImageFormat;
use regex::Regex;
use std::io::Cursor;
use std::path::Path;
use std::sync::LazyLock;

/// Name recorded as the producer of every document
pub const GENERATOR: &str = "ocr-document-server";

/// Bounding box for the embedded source image, in pixels
pub const MAX_IMAGE_WIDTH: u32 = 400;
pub const MAX_IMAGE_HEIGHT: u32 = 300;

/// Longest title prefix kept in an output filename
const MAX_FILENAME_TITLE_LEN: usize = 80;

static BLANK_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[^\S\n]*\n").expect("failed to compile regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Docx,
}

impl OutputFormat {
    /// Parse a form or CLI value
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "txt" | "text" => Some(Self::Text),
            "docx" | "document" | "word" => Some(Self::Docx),
            _ => None,
        }
    }

    /// Short name reported to clients, also the file extension
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Docx => "docx",
        }
    }

    pub fn all() -> [Self; 2] {
        [Self::Text, Self::Docx]
    }
}

/// Per-request presentation options
#[derive(Debug, Clone)]
pub struct DocumentOptions {
    pub format: OutputFormat,
    pub font_size: u32,
    pub include_image: bool,
    pub add_timestamp: bool,
}

/// Source image prepared for embedding, with its display size
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Everything a writer needs to render one document
#[derive(Debug)]
pub struct DocumentContent<'a> {
    pub title: &'a str,
    pub text: &'a FormattedText,
    pub image: Option<EmbeddedImage>,
    pub options: &'a DocumentOptions,
    pub generated_at: DateTime<Local>,
}

impl DocumentContent<'_> {
    pub fn timestamp(&self) -> String {
        human_timestamp(&self.generated_at)
    }
}

/// Renders [`DocumentContent`] into the bytes of one file format
pub trait DocumentWriter: Send + Sync {
    fn format(&self) -> OutputFormat;

    fn render(&self, content: &DocumentContent<'_>) -> Result<Vec<u8>, ConvertError>;
}

/// A rendered document, not yet written anywhere
#[derive(Debug)]
pub struct AssembledDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
}

/// The set of writers available to the pipeline
pub struct DocumentAssembler {
    text: text::TextWriter,
    docx: docx::DocxWriter,
}

impl DocumentAssembler {
    /// Construct all writers, failing if any of them cannot produce output
    pub fn new() -> Result<Self, ConvertError> {
        let docx = docx::DocxWriter::new()?;
        tracing::info!("Document writers ready: txt, docx");
        Ok(Self {
            text: text::TextWriter,
            docx,
        })
    }

    fn writer(&self, format: OutputFormat) -> &dyn DocumentWriter {
        match format {
            OutputFormat::Text => &self.text,
            OutputFormat::Docx => &self.docx,
        }
    }

    pub fn assemble(
        &self,
        title: &str,
        text: &FormattedText,
        image_path: Option<&Path>,
        options: &DocumentOptions,
        generated_at: DateTime<Local>,
    ) -> Result<AssembledDocument, ConvertError> {
        let writer = self.writer(options.format);

        let image = match image_path {
            Some(path) if options.include_image && writer.format() == OutputFormat::Docx => {
                match load_embedded_image(path) {
                    Ok(image) => Some(image),
                    Err(e) => {
                        // The image is decoration; the text still ships.
                        tracing::warn!("Continuing without source image: {}", e);
                        None
                    }
                }
            }
            _ => None,
        };

        let content = DocumentContent {
            title,
            text,
            image,
            options,
            generated_at,
        };

        let bytes = writer.render(&content)?;

        Ok(AssembledDocument {
            filename: output_filename(title, options.format, &generated_at),
            bytes,
            format: options.format,
        })
    }
}

/// Read and re-encode the source image, scaled to the bounding box
fn load_embedded_image(path: &Path) -> Result<EmbeddedImage, String> {
    let data = std::fs::read(path).map_err(|e| format!("cannot read image: {}", e))?;
    let img = image::load_from_memory(&data).map_err(|e| format!("cannot decode image: {}", e))?;

    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| format!("cannot encode image: {}", e))?;

    let (width, height) = fit_within(img.width(), img.height(), MAX_IMAGE_WIDTH, MAX_IMAGE_HEIGHT);
    Ok(EmbeddedImage { png, width, height })
}

/// Scale `width`x`height` down to fit the box, keeping the aspect ratio.
/// Images already inside the box keep their native size.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let scale = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let scaled = |v: u32| ((v as f64 * scale).round() as u32).max(1);
    (scaled(width), scaled(height))
}

/// Paragraphs separated by blank lines, trimmed, empty ones dropped
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    BLANK_LINE
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

pub fn human_timestamp(at: &DateTime<Local>) -> String {
    at.format("%B %-d, %Y at %-I:%M %p").to_string()
}

/// `<title>_<timestamp>_<token>.<ext>`; the random token keeps requests
/// finishing within the same second apart
pub fn output_filename(title: &str, format: OutputFormat, at: &DateTime<Local>) -> String {
    let safe_title: String = sanitize_title(title)
        .chars()
        .take(MAX_FILENAME_TITLE_LEN)
        .collect();
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}.{}",
        safe_title,
        at.format("%Y-%m-%d_%H-%M-%S"),
        &token[..12],
        format.as_str()
    )
}
