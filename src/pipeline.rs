//! Conversion pipeline
//!
//! One request moves through
//! `Received → Validated → Stored → Extracted → Formatted → Assembled → Completed`
//! and any failure ends it in `Failed`. The uploaded image is removed before
//! [`Pipeline::convert`] returns, whichever way it ends; if the request future
//! is dropped instead, the image guard and the engine's child process clean up
//! on drop.

use crate::config::Config;
use crate::document::{DocumentAssembler, DocumentOptions, OutputFormat};
use crate::engine::OcrEngine;
use crate::error::ConvertError;
use crate::request::{ConversionForm, ConversionRequest, ValidationLimits};
use crate::storage::{remove_quietly, Storage, TemporaryImage};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// URL prefix under which generated documents are served
pub const OUTPUT_URL_PREFIX: &str = "output";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Stored,
    Extracted,
    Formatted,
    Assembled,
    Completed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::Stored => "stored",
            Stage::Extracted => "extracted",
            Stage::Formatted => "formatted",
            Stage::Assembled => "assembled",
            Stage::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful conversion
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub filename: String,
    /// Location on disk
    pub path: PathBuf,
    /// Location relative to the server root, for download links
    pub relative_path: String,
    pub file_size: u64,
    pub word_count: usize,
    pub character_count: usize,
    pub format: OutputFormat,
}

pub struct Pipeline {
    storage: Storage,
    engine: Arc<dyn OcrEngine>,
    assembler: DocumentAssembler,
    limits: ValidationLimits,
}

impl Pipeline {
    pub fn new(
        storage: Storage,
        engine: Arc<dyn OcrEngine>,
        assembler: DocumentAssembler,
        config: &Config,
    ) -> Self {
        Self {
            storage,
            engine,
            assembler,
            limits: ValidationLimits {
                max_file_size: config.max_file_size,
                default_language: config.default_language.clone(),
                default_format: config.default_format,
            },
        }
    }

    pub fn engine(&self) -> &dyn OcrEngine {
        self.engine.as_ref()
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// Run one request from raw form fields to a document on disk
    pub async fn convert(&self, form: ConversionForm) -> Result<ConversionResult, ConvertError> {
        let start = Instant::now();
        let mut stage = Stage::Received;

        let result = self.run(form, &mut stage).await;

        match &result {
            Ok(done) => tracing::info!(
                "Conversion completed in {}ms: {:?} ({} bytes, {} words)",
                start.elapsed().as_millis(),
                done.path,
                done.file_size,
                done.word_count
            ),
            Err(e @ ConvertError::Validation(_)) => {
                tracing::warn!("Conversion rejected after stage '{}': {}", stage, e)
            }
            Err(e) => tracing::error!("Conversion failed after stage '{}': {}", stage, e),
        }

        result
    }

    async fn run(
        &self,
        form: ConversionForm,
        stage: &mut Stage,
    ) -> Result<ConversionResult, ConvertError> {
        let request = ConversionRequest::from_form(form, &self.limits)?;
        advance(stage, Stage::Validated);

        let image = self
            .storage
            .persist_upload(&request.image.data, &request.image.file_name)?;
        advance(stage, Stage::Stored);

        let outcome = self.process(&request, &image, stage).await;
        image.cleanup();
        outcome
    }

    /// The stages that need the stored image
    async fn process(
        &self,
        request: &ConversionRequest,
        image: &TemporaryImage,
        stage: &mut Stage,
    ) -> Result<ConversionResult, ConvertError> {
        tracing::debug!(
            "Running OCR on {}x{} image ({}, language {})",
            request.width,
            request.height,
            request.image.content_type.as_deref().unwrap_or("unknown type"),
            request.language
        );
        let extracted = self
            .engine
            .extract_text(image.path(), &request.language)
            .await?;
        advance(stage, Stage::Extracted);

        let formatted = request.formatting.apply(&extracted);
        if formatted.is_placeholder() {
            tracing::info!("No text found in {:?}", request.image.file_name);
        }
        advance(stage, Stage::Formatted);

        let options = DocumentOptions {
            format: request.output_format,
            font_size: request.font_size,
            include_image: request.include_image,
            add_timestamp: request.add_timestamp,
        };
        let document = self.assembler.assemble(
            &request.title,
            &formatted,
            Some(image.path()),
            &options,
            chrono::Local::now(),
        )?;
        advance(stage, Stage::Assembled);

        let path = self.storage.write_output(&document.filename, &document.bytes)?;
        let file_size = match std::fs::metadata(&path) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                tracing::error!("Cannot measure {:?}: {}", path, e);
                remove_quietly(&path);
                return Err(ConvertError::DocumentWrite(
                    "could not determine output file size".to_string(),
                ));
            }
        };
        advance(stage, Stage::Completed);

        Ok(ConversionResult {
            relative_path: format!("{}/{}", OUTPUT_URL_PREFIX, document.filename),
            filename: document.filename,
            path,
            file_size,
            word_count: formatted.word_count(),
            character_count: formatted.character_count(),
            format: document.format,
        })
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    tracing::debug!("Conversion stage {} -> {}", stage, next);
    *stage = next;
}
