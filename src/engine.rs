use crate::error::ConvertError;
use async_trait::async_trait;
use std::path::Path;

/// Interface to an OCR backend.
///
/// Implementations receive the path of an image owned by the caller and a
/// language code, and return the recognised text with surrounding whitespace
/// trimmed. An empty string means the engine ran but found no text.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Returns the engine identifier (e.g., "tesseract")
    fn name(&self) -> &str;

    /// Returns a human-readable description of the engine
    fn description(&self) -> &'static str;

    /// Whether the engine can currently be invoked
    fn is_available(&self) -> bool;

    /// Extract text from an image file
    async fn extract_text(&self, image: &Path, language: &str) -> Result<String, ConvertError>;
}
