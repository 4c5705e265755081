//! Word (`.docx`) output
//!
//! The document is first laid out as a flat list of [`Block`]s and then
//! rendered with `docx-rs`. Block sizes are in points; `docx-rs` wants
//! half-points for text and EMU for pictures.

use super::{split_paragraphs, DocumentContent, DocumentWriter, OutputFormat, GENERATOR};
use crate::error::ConvertError;
use docx_rs::{AlignmentType, BreakType, Docx, Paragraph, Pic, Run};
use std::io::Cursor;

/// English Metric Units per pixel at 96 DPI
const EMU_PER_PIXEL: u32 = 9525;

/// Smallest point size the layout will emit
const MIN_POINT_SIZE: u32 = 6;

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title { text: String, size: u32 },
    Timestamp { text: String, size: u32 },
    Image { png: Vec<u8>, width: u32, height: u32 },
    Label { text: String, size: u32 },
    Paragraph { text: String, size: u32 },
    Metadata { entries: Vec<(String, String)>, size: u32 },
}

/// Arrange the content in reading order
pub fn layout(content: &DocumentContent<'_>) -> Vec<Block> {
    let size = content.options.font_size;
    let mut blocks = vec![Block::Title {
        text: content.title.to_string(),
        size: size + 4,
    }];

    if content.options.add_timestamp {
        blocks.push(Block::Timestamp {
            text: format!("Generated on: {}", content.timestamp()),
            size: size.saturating_sub(2).max(MIN_POINT_SIZE),
        });
    }

    if let Some(image) = &content.image {
        blocks.push(Block::Image {
            png: image.png.clone(),
            width: image.width,
            height: image.height,
        });
        blocks.push(Block::Label {
            text: "Source Image".to_string(),
            size,
        });
    }

    blocks.push(Block::Label {
        text: "Extracted Text".to_string(),
        size,
    });

    blocks.extend(
        split_paragraphs(content.text.body())
            .into_iter()
            .map(|p| Block::Paragraph {
                text: p.to_string(),
                size,
            }),
    );

    blocks.push(Block::Metadata {
        entries: vec![
            ("Generated by".to_string(), GENERATOR.to_string()),
            ("Generated on".to_string(), content.timestamp()),
            ("Word count".to_string(), content.text.word_count().to_string()),
            (
                "Character count".to_string(),
                content.text.character_count().to_string(),
            ),
        ],
        size: size.saturating_sub(2).max(MIN_POINT_SIZE),
    });

    blocks
}

fn half_points(points: u32) -> usize {
    points as usize * 2
}

/// A run with line breaks where the text has newlines
fn text_run(text: &str) -> Run {
    let mut run = Run::new();
    for (i, line) in text.lines().enumerate() {
        if i > 0 {
            run = run.add_break(BreakType::TextWrapping);
        }
        run = run.add_text(line);
    }
    run
}

fn render_block(docx: Docx, block: Block) -> Docx {
    match block {
        Block::Title { text, size } => docx.add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text(text).bold().size(half_points(size)))
                .align(AlignmentType::Center),
        ),
        Block::Timestamp { text, size } => docx.add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text(text).italic().size(half_points(size)))
                .align(AlignmentType::Center),
        ),
        Block::Image { png, width, height } => {
            let pic = Pic::new(&png).size(width * EMU_PER_PIXEL, height * EMU_PER_PIXEL);
            docx.add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_image(pic))
                    .align(AlignmentType::Center),
            )
        }
        Block::Label { text, size } => docx.add_paragraph(
            Paragraph::new().add_run(Run::new().add_text(text).bold().size(half_points(size))),
        ),
        Block::Paragraph { text, size } => {
            docx.add_paragraph(Paragraph::new().add_run(text_run(&text).size(half_points(size))))
        }
        Block::Metadata { entries, size } => {
            let docx = docx.add_paragraph(
                Paragraph::new().add_run(
                    Run::new()
                        .add_text("Document Information")
                        .bold()
                        .size(half_points(size)),
                ),
            );
            entries.into_iter().fold(docx, |docx, (key, value)| {
                docx.add_paragraph(
                    Paragraph::new().add_run(
                        Run::new()
                            .add_text(format!("{}: {}", key, value))
                            .size(half_points(size)),
                    ),
                )
            })
        }
    }
}

fn pack(docx: Docx) -> Result<Vec<u8>, ConvertError> {
    let mut buf = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buf)
        .map_err(|e| ConvertError::DocumentWrite(e.to_string()))?;
    Ok(buf.into_inner())
}

/// Writer backed by `docx-rs`
pub struct DocxWriter;

impl DocxWriter {
    /// Create the writer after checking that an empty document can be packed
    pub fn new() -> Result<Self, ConvertError> {
        let probe = pack(Docx::new())?;
        tracing::debug!("docx writer probe produced {} bytes", probe.len());
        Ok(Self)
    }
}

impl DocumentWriter for DocxWriter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Docx
    }

    fn render(&self, content: &DocumentContent<'_>) -> Result<Vec<u8>, ConvertError> {
        let docx = layout(content)
            .into_iter()
            .fold(Docx::new(), render_block);
        pack(docx)
    }
}
