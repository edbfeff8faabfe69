//! Status, health and usage endpoints

use axum::{
    extract::State,
    response::Html,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::browser::PoolStats;
use crate::conversion::PageFormat;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/health", get(health_check))
        .route("/api/usage", get(usage))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub environment: String,
    pub version: &'static str,
    pub backend: &'static str,
    pub remote_api_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<PoolStats>,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let config = state.config();
    let service = state.service();

    Json(StatusResponse {
        status: "online",
        timestamp: Utc::now(),
        environment: config.server.environment.clone(),
        version: env!("CARGO_PKG_VERSION"),
        backend: service.backend_name(),
        remote_api_configured: config.remote.api_key.is_some(),
        sessions: service.session_stats(),
    })
}

const EXAMPLE_BODY: &str = r#"{"html":"<h1>Hello</h1>","options":{"format":"A4","landscape":false}}"#;

async fn index(State(state): State<AppState>) -> Html<String> {
    let backend = html_escape::encode_text(state.service().backend_name());
    let environment = html_escape::encode_text(&state.config().server.environment);
    let example = html_escape::encode_text(EXAMPLE_BODY);

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>HTML to PDF</title>
</head>
<body>
  <h1>HTML to PDF</h1>
  <p>Backend: <strong>{backend}</strong> ({environment})</p>
  <p>Server time: {timestamp}</p>
  <h2>Usage</h2>
  <p><code>POST /convert</code> with <code>Content-Type: application/json</code>:</p>
  <pre>{example}</pre>
  <p>The response is the PDF document as an attachment.</p>
  <p>See <a href="/api/usage">/api/usage</a> for all options and <a href="/status">/status</a> for service status.</p>
</body>
</html>"#,
        timestamp = Utc::now().to_rfc3339(),
    ))
}

async fn usage(State(state): State<AppState>) -> Json<Value> {
    let defaults = state.service().defaults();
    let formats: Vec<&str> = PageFormat::ALL.iter().map(|f| f.as_str()).collect();

    Json(json!({
        "endpoint": "/convert",
        "aliases": ["/api/convert"],
        "method": "POST",
        "contentType": "application/json",
        "body": {
            "html": "HTML markup to render (required; `htmlContent` is accepted too)",
            "options": {
                "format": { "values": formats, "default": PageFormat::default().as_str() },
                "landscape": { "default": false },
                "printBackground": { "default": true },
                "margin": {
                    "description": "a length for all sides or {top, right, bottom, left}; units px, in, cm, mm",
                    "default": defaults.margin.to_string(),
                },
                "viewport": { "description": "{width, height} in CSS pixels", "default": { "width": 1240, "height": 1754 } },
                "timeoutMs": {
                    "default": defaults.timeout.as_millis() as u64,
                    "max": defaults.max_timeout.as_millis() as u64,
                },
            },
        },
        "response": "application/pdf attachment",
        "example": format!(
            "curl -X POST http://localhost:3000/convert -H 'Content-Type: application/json' -d '{}' -o document.pdf",
            EXAMPLE_BODY
        ),
    }))
}
