//! Plain-text output

use super::{DocumentContent, DocumentWriter, OutputFormat};
use crate::error::ConvertError;

/// Writes a header, the extracted text and a word/character summary
pub struct TextWriter;

impl DocumentWriter for TextWriter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Text
    }

    fn render(&self, content: &DocumentContent<'_>) -> Result<Vec<u8>, ConvertError> {
        let out = format!(
            "Document: {title}\n\
             Generated on: {timestamp}\n\
             \n\
             Extracted Text:\n\
             \n\
             {body}\n\
             \n\
             ---\n\
             Total words: {words}\n\
             Total characters: {characters}\n",
            title = content.title,
            timestamp = content.timestamp(),
            body = content.text.body(),
            words = content.text.word_count(),
            characters = content.text.character_count(),
        );

        Ok(out.into_bytes())
    }
}
