use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod document;
mod engine;
mod engines;
mod error;
mod formatting;
mod pipeline;
mod request;
mod server;
mod storage;

#[derive(Parser, Debug)]
#[command(name = "ocr-document-server")]
#[command(about = "Converts uploaded images into text or Word documents using OCR")]
#[command(version)]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "OCR_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "OCR_PORT", default_value = "9292")]
    pub port: u16,

    /// Default language for OCR (e.g., "eng", "deu", "fra")
    #[arg(long, env = "OCR_DEFAULT_LANGUAGE", default_value = "eng")]
    pub default_language: String,

    /// Maximum upload size in bytes (default: 10MB)
    #[arg(long, env = "OCR_MAX_FILE_SIZE", default_value = "10485760")]
    pub max_file_size: usize,

    /// Directory for temporary uploaded images
    #[arg(long, env = "OCR_UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: String,

    /// Directory for generated documents, served under /output
    #[arg(long, env = "OCR_OUTPUT_DIR", default_value = "output")]
    pub output_dir: String,

    /// OCR engine executable (name on PATH or explicit path)
    #[arg(long, env = "OCR_ENGINE_BINARY", default_value = "tesseract")]
    pub engine_binary: String,

    /// Upper bound for a single OCR run, in seconds
    #[arg(long, env = "OCR_TIMEOUT_SECS", default_value = "60")]
    pub ocr_timeout_secs: u64,

    /// Output format used when a request does not ask for one (docx, txt)
    #[arg(long, env = "OCR_DEFAULT_FORMAT", default_value = "docx")]
    pub default_format: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::try_from(args)?;

    tracing::info!(
        "Starting ocr-document-server v{}",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("Binding to {}:{}", config.host, config.port);

    server::run(config).await
}
