//! OCR engine implementations
//!
//! The only backend today drives the `tesseract` command-line tool. Other
//! backends plug in by implementing [`OcrEngine`].

pub mod tesseract;

use crate::config::Config;
use crate::engine::OcrEngine;
use serde::Serialize;
use std::sync::Arc;

/// Information about the configured engine
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineInfo {
    pub name: String,
    pub description: &'static str,
    pub available: bool,
}

impl EngineInfo {
    pub fn of(engine: &dyn OcrEngine) -> Self {
        Self {
            name: engine.name().to_string(),
            description: engine.description(),
            available: engine.is_available(),
        }
    }
}

/// Build the engine described by the configuration.
///
/// A missing binary is not fatal here: requests report it individually so the
/// server can still answer health checks and serve earlier output.
pub fn from_config(config: &Config) -> Arc<dyn OcrEngine> {
    let engine = tesseract::TesseractCli::new(&config.engine_binary, config.ocr_timeout);

    if engine.is_available() {
        tracing::info!("OCR engine '{}' found", config.engine_binary);
    } else {
        tracing::warn!(
            "OCR engine '{}' not found; conversions will fail until it is installed",
            config.engine_binary
        );
    }

    Arc::new(engine)
}
