use crate::config::Config;
use crate::document::{DocumentAssembler, OutputFormat};
use crate::engines::{self, EngineInfo};
use crate::error::ConvertError;
use crate::formatting::FormattingMode;
use crate::pipeline::{ConversionResult, Pipeline, OUTPUT_URL_PREFIX};
use crate::request::{ConversionForm, UploadedImage};
use crate::storage::Storage;
use axum::extract::multipart::MultipartRejection;
use axum::{
    extract::{multipart::Field, DefaultBodyLimit, Multipart, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and text fields on top of the image itself
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub config: Arc<Config>,
}

/// Successful conversion response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub success: bool,
    pub filename: String,
    pub filepath: String,
    pub file_size: u64,
    pub word_count: usize,
    pub character_count: usize,
    pub format: &'static str,
}

impl From<ConversionResult> for ConvertResponse {
    fn from(result: ConversionResult) -> Self {
        Self {
            success: true,
            filename: result.filename,
            filepath: result.relative_path,
            file_size: result.file_size,
            word_count: result.word_count,
            character_count: result.character_count,
            format: result.format.as_str(),
        }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub version: String,
    pub engine: EngineInfo,
    pub output_formats: Vec<&'static str>,
    pub formatting_modes: Vec<&'static str>,
    pub max_file_size_bytes: usize,
    pub default_language: String,
    pub default_format: &'static str,
}

/// Build the shared state: directories, engine and document writers
pub fn build_state(config: Config) -> anyhow::Result<AppState> {
    let storage = Storage::new(&config.upload_dir, &config.output_dir).map_err(|e| {
        anyhow::anyhow!(
            "Failed to prepare directories {:?} and {:?}: {}",
            config.upload_dir,
            config.output_dir,
            e
        )
    })?;
    let engine = engines::from_config(&config);
    let assembler = DocumentAssembler::new()
        .map_err(|e| anyhow::anyhow!("Document writer unavailable: {}", e))?;

    let pipeline = Pipeline::new(storage, engine, assembler, &config);

    Ok(AppState {
        pipeline: Arc::new(pipeline),
        config: Arc::new(config),
    })
}

/// Routes and middleware
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_file_size + FORM_OVERHEAD_BYTES;
    let output = ServeDir::new(&state.config.output_dir);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/convert", post(handle_convert).options(handle_preflight))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .nest_service(&format!("/{}", OUTPUT_URL_PREFIX), output)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = build_state(config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Handle conversion requests
async fn handle_convert(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ConvertResponse>, ConvertError> {
    let form = match multipart {
        Ok(multipart) => read_form(multipart).await,
        Err(rejection) => ConversionForm {
            upload_error: Some(rejection.body_text()),
            ..Default::default()
        },
    };
    let result = state.pipeline.convert(form).await?;
    Ok(Json(result.into()))
}

/// Collect the multipart fields. Stream errors are recorded on the form and
/// rejected during validation.
async fn read_form(mut multipart: Multipart) -> ConversionForm {
    let mut form = ConversionForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                form.upload_error = Some(e.to_string());
                break;
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        let slot = match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or("image").to_string();
                let content_type = field.content_type().map(|s| s.to_string());
                match field.bytes().await {
                    Ok(data) => {
                        form.image = Some(UploadedImage {
                            file_name,
                            content_type,
                            data,
                        })
                    }
                    Err(e) => {
                        form.upload_error = Some(e.to_string());
                        break;
                    }
                }
                continue;
            }
            "title" => &mut form.title,
            "language" => &mut form.language,
            "formatting" => &mut form.formatting,
            "fontSize" => &mut form.font_size,
            "includeImage" => &mut form.include_image,
            "addTimestamp" => &mut form.add_timestamp,
            "outputFormat" => &mut form.output_format,
            _ => {
                // Ignore unknown fields
                continue;
            }
        };

        match read_text(field).await {
            Ok(value) => *slot = Some(value),
            Err(e) => {
                form.upload_error = Some(e);
                break;
            }
        }
    }

    form
}

async fn read_text(field: Field<'_>) -> Result<String, String> {
    field.text().await.map_err(|e| e.to_string())
}

/// CORS preflight for browsers posting the upload form
async fn handle_preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
    )
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    let limits = state.pipeline.limits();
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: EngineInfo::of(state.pipeline.engine()),
        output_formats: OutputFormat::all().iter().map(|f| f.as_str()).collect(),
        formatting_modes: FormattingMode::all().iter().map(|m| m.as_str()).collect(),
        max_file_size_bytes: limits.max_file_size,
        default_language: limits.default_language.clone(),
        default_format: limits.default_format.as_str(),
    })
}
