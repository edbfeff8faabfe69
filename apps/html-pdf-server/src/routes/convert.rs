//! Conversion routes
//!
//! `POST /convert` and `POST /api/convert` take `{ "html": ..., "options": ... }`
//! and answer with the PDF as an attachment.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::post,
    Router,
};
use serde_json::Value;

use crate::conversion::{ConversionError, ConversionRequest};
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Create the conversion router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/convert", post(convert))
        .route("/api/convert", post(convert))
}

async fn convert(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response> {
    require_json(&headers)?;

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Malformed JSON body: {}", e)))?;
    let payload = payload
        .as_object()
        .ok_or_else(|| AppError::BadRequest("Request body must be a JSON object".to_string()))?;

    let html = extract_html(payload)?;
    let service = state.service();
    let options = service.parse_options(payload.get("options"))?;

    let pdf = service.convert(ConversionRequest::new(html, options)).await?;

    let filename = format!("document-{}.pdf", chrono::Utc::now().timestamp_millis());
    let length = pdf.content_length();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_LENGTH, length)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(pdf.into_bytes()))
        .map_err(|e| AppError::Internal(e.to_string()))
}

fn require_json(headers: &HeaderMap) -> Result<()> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.to_ascii_lowercase().contains("application/json") {
        Ok(())
    } else {
        Err(AppError::UnsupportedMediaType(
            "Content-Type must be application/json".to_string(),
        ))
    }
}

/// `html`, or the legacy `htmlContent` key
fn extract_html(payload: &serde_json::Map<String, Value>) -> Result<String> {
    let value = ["html", "htmlContent"]
        .iter()
        .find_map(|key| payload.get(*key).filter(|v| !v.is_null()));

    match value {
        None => Err(ConversionError::MissingContent.into()),
        Some(Value::String(html)) => Ok(html.clone()),
        Some(_) => Err(AppError::BadRequest("`html` must be a string".to_string())),
    }
}
