//! Remote API backend
//!
//! Delegates rendering to an external HTML-to-PDF HTTP service.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::{header, StatusCode};
use serde::Serialize;
use serde_json::Value;

use super::backend::ConversionBackend;
use super::options::RenderOptions;
use super::types::ConversionError;
use crate::config::RemoteApiConfig;

/// Build the Basic credential for an API key (`api:<key>`)
pub fn basic_auth_header(api_key: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("api:{}", api_key)))
}

/// Request body understood by the remote service
#[derive(Debug, Serialize)]
struct RemotePayload<'a> {
    source: &'a str,
    landscape: bool,
    format: &'static str,
    use_print: bool,
    disable_backgrounds: bool,
}

impl<'a> RemotePayload<'a> {
    fn new(html: &'a str, options: &RenderOptions) -> Self {
        Self {
            source: html,
            landscape: options.landscape,
            format: options.format.as_str(),
            use_print: false,
            disable_backgrounds: !options.print_background,
        }
    }
}

/// Where the detail of a failed remote call came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDetail {
    /// Extracted from a JSON error body
    Json(String),
    /// The body as plain text
    Text(String),
    /// Status line only; the body was empty or not UTF-8
    Status(String),
}

impl ErrorDetail {
    /// Resolve the detail of an error response body
    ///
    /// UTF-8 text, then a JSON `message` or `error` field, then the raw text,
    /// then the status line.
    pub fn resolve(status: StatusCode, body: &[u8]) -> Self {
        let text = match std::str::from_utf8(body) {
            Ok(text) if !text.trim().is_empty() => text.trim(),
            _ => return Self::Status(status_line(status)),
        };

        match serde_json::from_str::<Value>(text) {
            Ok(json) => Self::Json(json_message(&json)),
            Err(_) => Self::Text(text.to_string()),
        }
    }

    pub fn into_message(self) -> String {
        match self {
            Self::Json(m) | Self::Text(m) | Self::Status(m) => m,
        }
    }
}

fn status_line(status: StatusCode) -> String {
    format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown Status")
    )
}

fn json_message(json: &Value) -> String {
    json.as_str()
        .or_else(|| {
            ["message", "error"]
                .iter()
                .find_map(|key| json.get(*key).and_then(Value::as_str))
        })
        .map(str::to_string)
        .unwrap_or_else(|| json.to_string())
}

/// Remote conversion API backend
pub struct RemoteApiBackend {
    client: reqwest::Client,
    endpoint: String,
    credential: Option<String>,
}

impl RemoteApiBackend {
    pub fn new(config: &RemoteApiConfig) -> Self {
        let (endpoint, credential) = match config.api_key.as_deref() {
            Some(key) => (config.endpoint.clone(), Some(basic_auth_header(key))),
            None => {
                tracing::warn!(
                    "No PDF_API_KEY configured; using the unauthenticated demo endpoint {}. \
                     This mode is not suitable for production.",
                    config.demo_endpoint
                );
                (config.demo_endpoint.clone(), None)
            }
        };

        Self {
            client: reqwest::Client::new(),
            endpoint,
            credential,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ConversionBackend for RemoteApiBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn convert(&self, html: &str, options: &RenderOptions) -> Result<Vec<u8>, ConversionError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(options.timeout)
            .json(&RemotePayload::new(html, options));

        match &self.credential {
            Some(credential) => request = request.header(header::AUTHORIZATION, credential),
            None => tracing::warn!("Sending conversion to the demo endpoint without credentials"),
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, options))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, options))?;

        if !status.is_success() {
            let detail = ErrorDetail::resolve(status, &body);
            tracing::error!("Remote conversion returned {}: {:?}", status, detail);
            return Err(ConversionError::RemoteConversionFailed {
                status: status.as_u16(),
                detail: detail.into_message(),
            });
        }

        Ok(body.to_vec())
    }
}

fn transport_error(err: reqwest::Error, options: &RenderOptions) -> ConversionError {
    if err.is_timeout() {
        ConversionError::RenderTimeout(options.timeout)
    } else {
        ConversionError::UnknownConversionError(format!("Remote conversion request failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::{
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::post,
        Json, Router,
    };

    use super::*;
    use crate::conversion::options::RenderDefaults;

    async fn spawn_api(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/convert", addr)
    }

    async fn failing_api(status: AxumStatus, body: &'static str) -> String {
        spawn_api(Router::new().route("/convert", post(move || async move { (status, body) }))).await
    }

    fn backend(endpoint: &str, api_key: Option<&str>) -> RemoteApiBackend {
        RemoteApiBackend::new(&RemoteApiConfig {
            endpoint: endpoint.to_string(),
            demo_endpoint: endpoint.to_string(),
            api_key: api_key.map(str::to_string),
        })
    }

    fn options() -> RenderOptions {
        RenderOptions::with_defaults(&RenderDefaults::default())
    }

    #[test]
    fn test_basic_auth_header() {
        assert_eq!(basic_auth_header("secret"), "Basic YXBpOnNlY3JldA==");
    }

    #[test]
    fn test_error_detail_chain() {
        let status = StatusCode::UNPROCESSABLE_ENTITY;

        assert_eq!(
            ErrorDetail::resolve(status, br#"{"message":"bad selector"}"#),
            ErrorDetail::Json("bad selector".to_string())
        );
        assert_eq!(
            ErrorDetail::resolve(status, br#"{"error":"quota exceeded"}"#),
            ErrorDetail::Json("quota exceeded".to_string())
        );
        assert_eq!(
            ErrorDetail::resolve(status, br#""quota""#),
            ErrorDetail::Json("quota".to_string())
        );
        assert_eq!(
            ErrorDetail::resolve(status, br#"{"code":42}"#),
            ErrorDetail::Json(r#"{"code":42}"#.to_string())
        );
        assert_eq!(
            ErrorDetail::resolve(status, b"upstream exploded"),
            ErrorDetail::Text("upstream exploded".to_string())
        );
        assert_eq!(
            ErrorDetail::resolve(status, b""),
            ErrorDetail::Status("422 Unprocessable Entity".to_string())
        );
        assert_eq!(
            ErrorDetail::resolve(StatusCode::BAD_GATEWAY, &[0xff, 0xfe, 0x00]),
            ErrorDetail::Status("502 Bad Gateway".to_string())
        );
    }

    #[tokio::test]
    async fn test_json_error_body() {
        let url = failing_api(AxumStatus::UNPROCESSABLE_ENTITY, r#"{"message":"bad selector"}"#).await;

        let err = backend(&url, Some("key")).convert("<p>x</p>", &options()).await.unwrap_err();

        assert_eq!(
            err,
            ConversionError::RemoteConversionFailed {
                status: 422,
                detail: "bad selector".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_text_error_body() {
        let url = failing_api(AxumStatus::INTERNAL_SERVER_ERROR, "renderer unavailable").await;

        let err = backend(&url, Some("key")).convert("<p>x</p>", &options()).await.unwrap_err();

        assert_eq!(
            err,
            ConversionError::RemoteConversionFailed {
                status: 500,
                detail: "renderer unavailable".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_success_sends_credentials_and_payload() {
        let seen: Arc<Mutex<Option<(Option<String>, Value)>>> = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        let app = Router::new().route(
            "/convert",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    *captured.lock().unwrap() = Some((auth, body));
                    b"%PDF-1.4 remote".to_vec()
                }
            }),
        );
        let url = spawn_api(app).await;

        let mut opts = options();
        opts.landscape = true;
        opts.print_background = false;
        let bytes = backend(&url, Some("secret")).convert("<h1>Hi</h1>", &opts).await.unwrap();

        assert!(bytes.starts_with(b"%PDF-"));
        let (auth, body) = seen.lock().unwrap().take().unwrap();
        assert_eq!(auth.as_deref(), Some("Basic YXBpOnNlY3JldA=="));
        assert_eq!(body["source"], "<h1>Hi</h1>");
        assert_eq!(body["format"], "A4");
        assert_eq!(body["landscape"], true);
        assert_eq!(body["disable_backgrounds"], true);
        assert_eq!(body["use_print"], false);
    }

    #[tokio::test]
    async fn test_demo_mode_is_unauthenticated() {
        let seen = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        let app = Router::new().route(
            "/convert",
            post(move |headers: HeaderMap| {
                let captured = captured.clone();
                async move {
                    *captured.lock().unwrap() = Some(headers.contains_key("authorization"));
                    b"%PDF-1.4 demo".to_vec()
                }
            }),
        );
        let url = spawn_api(app).await;

        let remote = backend(&url, None);
        assert!(!remote.is_authenticated());
        remote.convert("<p>demo</p>", &options()).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), Some(false));
    }

    #[tokio::test]
    async fn test_slow_api_times_out() {
        let app = Router::new().route(
            "/convert",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                b"%PDF-1.4 late".to_vec()
            }),
        );
        let url = spawn_api(app).await;

        let mut opts = options();
        opts.timeout = Duration::from_millis(100);
        let err = backend(&url, Some("key")).convert("<p>x</p>", &opts).await.unwrap_err();

        assert_eq!(err, ConversionError::RenderTimeout(Duration::from_millis(100)));
    }
}
