//! Conversion types
//!
//! Request, result and error types shared by every conversion backend.

use std::time::Duration;

use axum::http::StatusCode;

use super::options::RenderOptions;

/// Magic header every PDF document starts with
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// A single HTML to PDF conversion request
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Raw HTML markup to render
    pub html: String,
    /// Fully resolved render options
    pub options: RenderOptions,
}

impl ConversionRequest {
    pub fn new(html: impl Into<String>, options: RenderOptions) -> Self {
        Self {
            html: html.into(),
            options,
        }
    }
}

/// A rendered PDF document
#[derive(Debug, Clone)]
pub struct PdfDocument {
    bytes: Vec<u8>,
}

impl PdfDocument {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Whether the buffer starts with the PDF magic header
    pub fn looks_like_pdf(bytes: &[u8]) -> bool {
        bytes.starts_with(PDF_MAGIC)
    }

    pub fn content_length(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Conversion error taxonomy
///
/// Backends translate their driver or transport errors into one of these
/// before returning, so nothing backend-specific reaches the service contract.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("HTML content is required")]
    MissingContent,

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Rendering timed out after {} ms", .0.as_millis())]
    RenderTimeout(Duration),

    #[error("Browser crashed: {0}")]
    BrowserCrashed(String),

    #[error("Remote conversion failed with status {status}: {detail}")]
    RemoteConversionFailed { status: u16, detail: String },

    #[error("Conversion failed: {0}")]
    UnknownConversionError(String),
}

impl ConversionError {
    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingContent => "missing_content",
            Self::InvalidOptions(_) => "invalid_options",
            Self::BrowserLaunchFailed(_) => "browser_launch_failed",
            Self::RenderTimeout(_) => "render_timeout",
            Self::BrowserCrashed(_) => "browser_crashed",
            Self::RemoteConversionFailed { .. } => "remote_conversion_failed",
            Self::UnknownConversionError(_) => "conversion_failed",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingContent | Self::InvalidOptions(_) => StatusCode::BAD_REQUEST,
            Self::RemoteConversionFailed { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message that is safe to return to an HTTP client
    ///
    /// Launch, crash and unknown failures can carry binary paths or driver
    /// internals, so they collapse to a fixed sentence.
    pub fn public_message(&self) -> String {
        match self {
            Self::MissingContent
            | Self::InvalidOptions(_)
            | Self::RenderTimeout(_)
            | Self::RemoteConversionFailed { .. } => self.to_string(),
            Self::BrowserLaunchFailed(_) => "The rendering browser could not be started".to_string(),
            Self::BrowserCrashed(_) => "The rendering browser stopped unexpectedly".to_string(),
            Self::UnknownConversionError(_) => "The document could not be converted".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ConversionError::MissingContent.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ConversionError::InvalidOptions("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ConversionError::RemoteConversionFailed {
                status: 422,
                detail: "bad selector".into()
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ConversionError::RenderTimeout(Duration::from_secs(1)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_public_message_hides_internals() {
        let err = ConversionError::BrowserLaunchFailed(
            "browser binary not found at /opt/secret/chrome".into(),
        );
        assert!(!err.public_message().contains("/opt/secret"));

        let err = ConversionError::RemoteConversionFailed {
            status: 422,
            detail: "bad selector".into(),
        };
        assert!(err.public_message().contains("bad selector"));
    }

    #[test]
    fn test_pdf_magic() {
        assert!(PdfDocument::looks_like_pdf(b"%PDF-1.7\n"));
        assert!(!PdfDocument::looks_like_pdf(b"<html>"));
        assert!(!PdfDocument::looks_like_pdf(b""));
    }
}
