//! Conversion Service
//!
//! Orchestrates a single conversion: validates the input, delegates to the
//! backend chosen at startup and normalizes the outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use uuid::Uuid;

use super::{
    backend::ConversionBackend,
    local::LocalBrowserBackend,
    options::{RenderDefaults, RenderOptions},
    remote::RemoteApiBackend,
    types::{ConversionError, ConversionRequest, PdfDocument},
};
use crate::browser::session::CLOSE_TIMEOUT;
use crate::browser::{ChromiumEngine, LaunchProfile, PoolStats, SessionPool};
use crate::config::{Config, DeploymentMode};

/// Extra time a backend gets past the request timeout to tear its session down
const TEARDOWN_GRACE: Duration = Duration::from_secs(CLOSE_TIMEOUT.as_secs() + 1);

/// HTML to PDF conversion service
pub struct ConversionService {
    backend: Arc<dyn ConversionBackend>,
    defaults: RenderDefaults,
    pool: Option<SessionPool>,
}

impl ConversionService {
    pub fn new(backend: Arc<dyn ConversionBackend>, defaults: RenderDefaults) -> Self {
        Self {
            backend,
            defaults,
            pool: None,
        }
    }

    /// Build the backend for the configured deployment mode
    pub fn from_config(config: &Config) -> Self {
        let defaults = config.render_defaults();

        let (backend, pool) = match config.conversion.mode {
            DeploymentMode::Remote => {
                let backend: Arc<dyn ConversionBackend> = Arc::new(RemoteApiBackend::new(&config.remote));
                (backend, None)
            }
            mode => {
                let profile = match mode {
                    DeploymentMode::Serverless => LaunchProfile::serverless(&config.browser),
                    _ => LaunchProfile::sandboxed_local(&config.browser),
                }
                .with_request_timeout(Duration::from_millis(config.conversion.max_timeout_ms));
                let pool = SessionPool::new(config.conversion.max_sessions);
                let backend: Arc<dyn ConversionBackend> =
                    Arc::new(LocalBrowserBackend::new(Arc::new(ChromiumEngine), profile, pool.clone()));
                (backend, Some(pool))
            }
        };

        tracing::info!(
            "Conversion backend: {} (default timeout {} ms)",
            backend.name(),
            defaults.timeout.as_millis()
        );

        Self {
            backend,
            defaults,
            pool,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn defaults(&self) -> &RenderDefaults {
        &self.defaults
    }

    /// Browser session counters; `None` for the remote backend
    pub fn session_stats(&self) -> Option<PoolStats> {
        self.pool.as_ref().map(SessionPool::stats)
    }

    /// Resolve the raw request options against this deployment's defaults
    pub fn parse_options(&self, raw: Option<&Value>) -> Result<RenderOptions, ConversionError> {
        RenderOptions::from_value(raw, &self.defaults)
    }

    pub async fn convert(&self, request: ConversionRequest) -> Result<PdfDocument, ConversionError> {
        if request.html.trim().is_empty() {
            return Err(ConversionError::MissingContent);
        }

        let request_id = Uuid::new_v4();
        let backend = self.backend.name();
        let options = &request.options;
        let started = Instant::now();

        tracing::info!(
            "[{}] Converting {} bytes of HTML with {} backend ({}, landscape: {})",
            request_id,
            request.html.len(),
            backend,
            options.format,
            options.landscape
        );

        let bound = options.timeout + TEARDOWN_GRACE;
        let result = match tokio::time::timeout(bound, self.backend.convert(&request.html, options)).await {
            Ok(result) => result,
            Err(_) => Err(ConversionError::RenderTimeout(options.timeout)),
        };

        let bytes = result.map_err(|e| {
            tracing::error!("[{}] {} backend failed: {}", request_id, backend, e);
            e
        })?;

        if !PdfDocument::looks_like_pdf(&bytes) {
            tracing::error!(
                "[{}] {} backend returned {} bytes without a PDF header",
                request_id,
                backend,
                bytes.len()
            );
            return Err(ConversionError::UnknownConversionError(
                "backend did not return a PDF document".to_string(),
            ));
        }

        tracing::info!(
            "[{}] Produced {} byte PDF in {} ms",
            request_id,
            bytes.len(),
            started.elapsed().as_millis()
        );

        Ok(PdfDocument::new(bytes))
    }
}
