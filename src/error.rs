use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Longest slice of engine output echoed back to clients
const MAX_DIAGNOSTICS_LEN: usize = 500;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Storage(String),

    #[error("OCR engine '{0}' is not installed on the server")]
    OcrUnavailable(String),

    #[error("OCR failed: {message}{}", render_diagnostics(.diagnostics))]
    OcrExecution { message: String, diagnostics: String },

    #[error("Failed to write document: {0}")]
    DocumentWrite(String),
}

impl ConvertError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ConvertError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ConvertError::Validation(_) => "VALIDATION_ERROR",
            ConvertError::Storage(_) => "STORAGE_ERROR",
            ConvertError::OcrUnavailable(_) => "OCR_UNAVAILABLE",
            ConvertError::OcrExecution { .. } => "OCR_EXECUTION_ERROR",
            ConvertError::DocumentWrite(_) => "DOCUMENT_WRITE_ERROR",
        }
    }

    /// Message shown to the client
    pub fn public_message(&self) -> String {
        match self {
            ConvertError::Validation(_) => self.to_string(),
            _ => format!("Conversion failed: {}", self),
        }
    }
}

fn render_diagnostics(diagnostics: &str) -> String {
    let trimmed = diagnostics.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut cut = trimmed.len().min(MAX_DIAGNOSTICS_LEN);
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    let ellipsis = if cut < trimmed.len() { "..." } else { "" };
    format!(". Engine output: {}{}", &trimmed[..cut], ellipsis)
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl IntoResponse for ConvertError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = Json(ErrorResponse {
            success: false,
            error: self.public_message(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}
