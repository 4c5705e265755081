use crate::document::OutputFormat;
use crate::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub default_language: String,
    pub max_file_size: usize,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub engine_binary: String,
    pub ocr_timeout: Duration,
    pub default_format: OutputFormat,
}

impl TryFrom<Args> for Config {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let default_format = OutputFormat::parse(&args.default_format).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown default format '{}' (expected docx or txt)",
                args.default_format
            )
        })?;

        if args.ocr_timeout_secs == 0 {
            anyhow::bail!("OCR timeout must be at least one second");
        }

        Ok(Self {
            host: args.host,
            port: args.port,
            default_language: args.default_language,
            max_file_size: args.max_file_size,
            upload_dir: PathBuf::from(args.upload_dir),
            output_dir: PathBuf::from(args.output_dir),
            engine_binary: args.engine_binary,
            ocr_timeout: Duration::from_secs(args.ocr_timeout_secs),
            default_format,
        })
    }
}

#[cfg(test)]
impl Config {
    /// Configuration rooted in a scratch directory, for tests.
    pub fn for_tests(root: &std::path::Path) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            default_language: "eng".to_string(),
            max_file_size: 1024 * 1024,
            upload_dir: root.join("uploads"),
            output_dir: root.join("output"),
            engine_binary: "tesseract".to_string(),
            ocr_timeout: Duration::from_secs(5),
            default_format: OutputFormat::Docx,
        }
    }
}
