//! Local browser backend
//!
//! Renders with a headless browser started on this host, one process per
//! request. The whole attempt (waiting for a slot, launch, render) runs
//! against the request deadline, and the session is closed on every path.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{timeout_at, Instant};

use super::backend::ConversionBackend;
use super::options::RenderOptions;
use super::types::ConversionError;
use crate::browser::{BrowserEngine, BrowserSession, EnvironmentProfile, LaunchProfile, SessionPool};

pub struct LocalBrowserBackend {
    engine: Arc<dyn BrowserEngine>,
    profile: LaunchProfile,
    pool: SessionPool,
}

impl LocalBrowserBackend {
    pub fn new(engine: Arc<dyn BrowserEngine>, profile: LaunchProfile, pool: SessionPool) -> Self {
        Self { engine, profile, pool }
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }
}

#[async_trait]
impl ConversionBackend for LocalBrowserBackend {
    fn name(&self) -> &'static str {
        match self.profile.environment {
            EnvironmentProfile::SandboxedLocal => "local",
            EnvironmentProfile::Serverless => "serverless",
        }
    }

    async fn convert(&self, html: &str, options: &RenderOptions) -> Result<Vec<u8>, ConversionError> {
        let deadline = Instant::now() + options.timeout;
        let timed_out = || ConversionError::RenderTimeout(options.timeout);

        let permit = timeout_at(deadline, self.pool.acquire())
            .await
            .map_err(|_| timed_out())??;

        let mut session = BrowserSession::new(self.engine.clone(), permit);
        tracing::debug!("Session {} started for {:?}", session.id(), self.profile.environment);

        let attempt = timeout_at(deadline, async {
            session.launch(&self.profile).await?;
            session.render_to_pdf(html, options).await
        })
        .await;

        session.close().await;

        match attempt {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    "Session {} exceeded the {} ms budget",
                    session.id(),
                    options.timeout.as_millis()
                );
                Err(timed_out())
            }
        }
    }
}
