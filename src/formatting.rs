//! Post-OCR text normalization
//!
//! Each [`FormattingMode`] is a pure function of the input text. Apart from the
//! paragraph separators written by [`FormattingMode::Paragraph`], formatting
//! only ever removes characters.

use regex::Regex;
use std::sync::LazyLock;

/// Body used when the engine found nothing to read
pub const NO_TEXT_PLACEHOLDER: &str = "No text was found in the image.";

/// Runs of whitespace that do not break lines
static HORIZONTAL_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\r\n]+").expect("failed to compile regex"));

/// Two or more blank lines in a row
static REPEATED_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(?:[^\S\r\n]*\n){2,}").expect("failed to compile regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormattingMode {
    /// Collapse horizontal whitespace, keep line breaks as they are
    #[default]
    Preserve,
    /// Like `Preserve`, but squeeze runs of blank lines into one paragraph break
    Paragraph,
    /// Engine output untouched
    Raw,
}

impl FormattingMode {
    /// Parse a form value, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "preserve" => Some(Self::Preserve),
            "paragraph" => Some(Self::Paragraph),
            "raw" => Some(Self::Raw),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preserve => "preserve",
            Self::Paragraph => "paragraph",
            Self::Raw => "raw",
        }
    }

    pub fn all() -> [Self; 3] {
        [Self::Preserve, Self::Paragraph, Self::Raw]
    }

    /// Apply this policy to raw engine output
    pub fn apply(&self, text: &str) -> FormattedText {
        if text.trim().is_empty() {
            return FormattedText {
                body: NO_TEXT_PLACEHOLDER.to_string(),
                placeholder: true,
            };
        }

        let body = match self {
            Self::Raw => text.to_string(),
            Self::Preserve => collapse_horizontal(text),
            Self::Paragraph => {
                let squeezed = REPEATED_BLANK_LINES.replace_all(text, "\n\n");
                collapse_horizontal(&squeezed)
            }
        };

        FormattedText {
            body,
            placeholder: false,
        }
    }
}

fn collapse_horizontal(text: &str) -> String {
    HORIZONTAL_WHITESPACE.replace_all(text, " ").into_owned()
}

/// Text ready for the document body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedText {
    body: String,
    placeholder: bool,
}

impl FormattedText {
    pub fn body(&self) -> &str {
        &self.body
    }

    /// True when the body is the "nothing found" placeholder
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Whitespace-delimited tokens in the body
    pub fn word_count(&self) -> usize {
        if self.placeholder {
            return 0;
        }
        word_count(&self.body)
    }

    /// Unicode scalar values in the body
    pub fn character_count(&self) -> usize {
        if self.placeholder {
            return 0;
        }
        self.body.chars().count()
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
