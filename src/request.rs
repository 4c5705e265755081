//! Upload validation
//!
//! Turns the raw multipart fields into a [`ConversionRequest`]. Missing or
//! malformed optional fields fall back to defaults; only a missing, oversized
//! or undecodable image is an error.

use crate::document::OutputFormat;
use crate::error::ConvertError;
use crate::formatting::FormattingMode;
use axum::body::Bytes;
use std::io::Cursor;

pub const DEFAULT_TITLE: &str = "Extracted Document";
pub const DEFAULT_FONT_SIZE: u32 = 12;
pub const MIN_FONT_SIZE: u32 = 8;
pub const MAX_FONT_SIZE: u32 = 72;

const MAX_LANGUAGE_LEN: usize = 64;

/// Decoder limits for uploaded images
const MAX_IMAGE_DIMENSION: u32 = 20_000;
const MAX_DECODE_ALLOC: u64 = 512 * 1024 * 1024;

/// A file part from the upload form
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Form fields exactly as received
#[derive(Debug, Clone, Default)]
pub struct ConversionForm {
    pub image: Option<UploadedImage>,
    /// Set when the multipart stream itself could not be read
    pub upload_error: Option<String>,
    pub title: Option<String>,
    pub language: Option<String>,
    pub formatting: Option<String>,
    pub font_size: Option<String>,
    pub include_image: Option<String>,
    pub add_timestamp: Option<String>,
    pub output_format: Option<String>,
}

/// Defaults and limits that depend on the deployment
#[derive(Debug, Clone)]
pub struct ValidationLimits {
    pub max_file_size: usize,
    pub default_language: String,
    pub default_format: OutputFormat,
}

/// A validated conversion request
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub image: UploadedImage,
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub language: String,
    pub formatting: FormattingMode,
    pub font_size: u32,
    pub include_image: bool,
    pub add_timestamp: bool,
    pub output_format: OutputFormat,
}

impl ConversionRequest {
    /// Validate the form, applying defaults to optional fields
    pub fn from_form(
        form: ConversionForm,
        limits: &ValidationLimits,
    ) -> Result<Self, ConvertError> {
        if let Some(reason) = &form.upload_error {
            tracing::warn!("Upload could not be read: {}", reason);
            return Err(missing_upload());
        }

        let image = form.image.ok_or_else(missing_upload)?;

        if image.data.is_empty() {
            return Err(missing_upload());
        }

        if image.data.len() > limits.max_file_size {
            return Err(ConvertError::Validation(format!(
                "Image too large: {} bytes (max: {} bytes)",
                image.data.len(),
                limits.max_file_size
            )));
        }

        let (width, height) = probe_dimensions(&image.data)?;

        Ok(Self {
            image,
            width,
            height,
            title: parse_title(form.title.as_deref()),
            language: parse_language(form.language.as_deref(), &limits.default_language),
            formatting: form
                .formatting
                .as_deref()
                .and_then(FormattingMode::parse)
                .unwrap_or_default(),
            font_size: parse_font_size(form.font_size.as_deref()),
            include_image: parse_flag(form.include_image.as_deref()),
            add_timestamp: parse_flag(form.add_timestamp.as_deref()),
            output_format: form
                .output_format
                .as_deref()
                .and_then(OutputFormat::parse)
                .unwrap_or(limits.default_format),
        })
    }
}

fn missing_upload() -> ConvertError {
    ConvertError::Validation("No image uploaded or upload error".to_string())
}

/// Decode the whole image so truncated or corrupt files are caught here
/// rather than by the OCR engine
fn probe_dimensions(data: &[u8]) -> Result<(u32, u32), ConvertError> {
    let mut reader = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(invalid_image)?;

    let mut limits = image::Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
    limits.max_image_height = Some(MAX_IMAGE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    reader.limits(limits);

    let img = reader.decode().map_err(invalid_image)?;
    if img.width() == 0 || img.height() == 0 {
        return Err(invalid_image("image has no pixels"));
    }
    Ok((img.width(), img.height()))
}

fn invalid_image(e: impl std::fmt::Display) -> ConvertError {
    tracing::debug!("Image probe failed: {}", e);
    ConvertError::Validation("Uploaded file is not a valid image".to_string())
}

pub fn parse_title(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => DEFAULT_TITLE.to_string(),
    }
}

/// Engine language codes look like `eng`, `chi_sim` or `eng+deu`
pub fn parse_language(raw: Option<&str>, default: &str) -> String {
    let Some(language) = raw.map(str::trim).filter(|l| !l.is_empty()) else {
        return default.to_string();
    };

    let well_formed = language.len() <= MAX_LANGUAGE_LEN
        && language
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '+');

    if well_formed {
        language.to_string()
    } else {
        tracing::warn!("Ignoring malformed language code {:?}", language);
        default.to_string()
    }
}

pub fn parse_font_size(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|size| (MIN_FONT_SIZE as i64..=MAX_FONT_SIZE as i64).contains(size))
        .map(|size| size as u32)
        .unwrap_or(DEFAULT_FONT_SIZE)
}

/// Absent flags default to on; present ones are on only for "1"
pub fn parse_flag(raw: Option<&str>) -> bool {
    match raw {
        None => true,
        Some(value) => value.trim() == "1",
    }
}

/// Replace anything outside `[A-Za-z0-9_-]` so the title can prefix a filename
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
