//! Browser session lifecycle
//!
//! One session is one browser process serving exactly one conversion.
//!
//! ```text
//! Uninitialized → Launching → Ready ⇄ Rendering
//!        └────────────┴─────────┴──────────┴──→ Closed
//! ```
//!
//! `close` is idempotent and never fails. A session dropped without being
//! closed hands its browser to a background task for teardown.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::engine::{BrowserEngine, BrowserInstance};
use super::pool::SessionPermit;
use super::profile::LaunchProfile;
use crate::conversion::{ConversionError, RenderOptions};

/// Upper bound for shutting a browser down
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Launching,
    Ready,
    Rendering,
    Closed,
}

pub struct BrowserSession {
    id: Uuid,
    engine: Arc<dyn BrowserEngine>,
    state: SessionState,
    instance: Option<Box<dyn BrowserInstance>>,
    permit: Option<SessionPermit>,
}

impl BrowserSession {
    pub fn new(engine: Arc<dyn BrowserEngine>, permit: SessionPermit) -> Self {
        Self {
            id: Uuid::new_v4(),
            engine,
            state: SessionState::Uninitialized,
            instance: None,
            permit: Some(permit),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Start the browser process
    pub async fn launch(&mut self, profile: &LaunchProfile) -> Result<(), ConversionError> {
        if self.state != SessionState::Uninitialized {
            return Err(ConversionError::UnknownConversionError(format!(
                "session {} cannot launch from state {:?}",
                self.id, self.state
            )));
        }

        self.state = SessionState::Launching;
        let instance = self.engine.launch(profile).await?;
        if let Some(permit) = &self.permit {
            permit.record_launch();
        }
        self.instance = Some(instance);
        self.state = SessionState::Ready;

        tracing::debug!("Session {} ready", self.id);
        Ok(())
    }

    pub async fn render_to_pdf(&mut self, html: &str, options: &RenderOptions) -> Result<Vec<u8>, ConversionError> {
        let instance = match (self.state, self.instance.as_mut()) {
            (SessionState::Ready, Some(instance)) => instance,
            (state, _) => {
                return Err(ConversionError::UnknownConversionError(format!(
                    "session {} cannot render from state {:?}",
                    self.id, state
                )))
            }
        };

        self.state = SessionState::Rendering;
        let result = instance.render_pdf(html, options).await;
        self.state = SessionState::Ready;

        result
    }

    /// Tear the browser down
    ///
    /// Safe to call in any state and any number of times. Teardown failures
    /// are logged and swallowed.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;

        if let Some(instance) = self.instance.take() {
            teardown(self.id, instance, self.permit.as_ref()).await;
        }
        self.permit = None;
    }
}

async fn teardown(id: Uuid, mut instance: Box<dyn BrowserInstance>, permit: Option<&SessionPermit>) {
    // Counted even if this future is dropped mid-close; the instance then
    // goes down with it and the process is killed on drop.
    let _closed = CloseRecord(permit);

    match tokio::time::timeout(CLOSE_TIMEOUT, instance.close()).await {
        Ok(Ok(())) => tracing::debug!("Session {} closed", id),
        Ok(Err(e)) => tracing::warn!("Session {} did not close cleanly: {}", id, e),
        Err(_) => tracing::warn!(
            "Session {} did not close within {} ms, dropping it",
            id,
            CLOSE_TIMEOUT.as_millis()
        ),
    }
}

/// Records the close of a session when dropped
struct CloseRecord<'a>(Option<&'a SessionPermit>);

impl Drop for CloseRecord<'_> {
    fn drop(&mut self) {
        if let Some(permit) = self.0 {
            permit.record_close();
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        let Some(instance) = self.instance.take() else {
            return;
        };
        let id = self.id;
        let permit = self.permit.take();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("Session {} dropped while open, closing in background", id);
                // The permit moves along so the slot stays taken until the
                // process is gone.
                handle.spawn(async move {
                    teardown(id, instance, permit.as_ref()).await;
                });
            }
            Err(_) => {
                tracing::warn!("Session {} dropped outside a runtime, browser killed on drop", id);
                if let Some(permit) = permit {
                    permit.record_close();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::engine::mock::{MockBehavior, MockEngine};
    use super::super::pool::SessionPool;
    use super::*;
    use crate::config::BrowserConfig;
    use crate::conversion::options::RenderDefaults;

    fn profile() -> LaunchProfile {
        LaunchProfile::sandboxed_local(&BrowserConfig::default())
    }

    fn options() -> RenderOptions {
        RenderOptions::with_defaults(&RenderDefaults::default())
    }

    async fn session(engine: &Arc<MockEngine>, pool: &SessionPool) -> BrowserSession {
        BrowserSession::new(engine.clone(), pool.acquire().await.unwrap())
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let engine = Arc::new(MockEngine::new(MockBehavior::Render));
        let pool = SessionPool::new(1);
        let mut session = session(&engine, &pool).await;
        assert_eq!(session.state(), SessionState::Uninitialized);

        session.launch(&profile()).await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);

        let pdf = session.render_to_pdf("<p>hi</p>", &options()).await.unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
        assert_eq!(session.state(), SessionState::Ready);

        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(engine.closes(), 1);
        assert_eq!(pool.stats().active, 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let engine = Arc::new(MockEngine::new(MockBehavior::Render));
        let pool = SessionPool::new(1);
        let mut session = session(&engine, &pool).await;
        session.launch(&profile()).await.unwrap();

        session.close().await;
        session.close().await;
        drop(session);

        assert_eq!(engine.launches(), 1);
        assert_eq!(engine.closes(), 1);
        assert_eq!(pool.stats().closed, 1);
    }

    #[tokio::test]
    async fn test_close_before_launch() {
        let engine = Arc::new(MockEngine::new(MockBehavior::Render));
        let pool = SessionPool::new(1);
        let mut session = session(&engine, &pool).await;

        session.close().await;

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(engine.closes(), 0);
        let err = session.render_to_pdf("<p>x</p>", &options()).await.unwrap_err();
        assert!(matches!(err, ConversionError::UnknownConversionError(_)));
    }

    #[tokio::test]
    async fn test_close_failure_is_swallowed() {
        let engine = Arc::new(MockEngine::new(MockBehavior::Render).failing_close());
        let pool = SessionPool::new(1);
        let mut session = session(&engine, &pool).await;
        session.launch(&profile()).await.unwrap();

        session.close().await;

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(engine.closes(), 1);
        assert_eq!(pool.stats().active, 0);
    }

    #[tokio::test]
    async fn test_render_failure_keeps_session_closable() {
        let engine = Arc::new(MockEngine::new(MockBehavior::Crash));
        let pool = SessionPool::new(1);
        let mut session = session(&engine, &pool).await;
        session.launch(&profile()).await.unwrap();

        let err = session.render_to_pdf("<p>x</p>", &options()).await.unwrap_err();
        assert!(matches!(err, ConversionError::BrowserCrashed(_)));

        session.close().await;
        assert_eq!(engine.closes(), 1);
    }

    #[tokio::test]
    async fn test_drop_closes_in_background() {
        let engine = Arc::new(MockEngine::new(MockBehavior::Render));
        let pool = SessionPool::new(1);
        let mut session = session(&engine, &pool).await;
        session.launch(&profile()).await.unwrap();

        drop(session);

        // Slot is only released once the background teardown finished
        let permit = tokio::time::timeout(Duration::from_secs(1), pool.acquire()).await;
        assert!(permit.is_ok());
        assert_eq!(engine.closes(), 1);
        assert_eq!(pool.stats().closed, 1);
    }

    #[tokio::test]
    async fn test_interrupted_close_still_counts() {
        let engine = Arc::new(MockEngine::new(MockBehavior::Render).slow_close(Duration::from_secs(3)));
        let pool = SessionPool::new(1);
        let mut session = session(&engine, &pool).await;
        session.launch(&profile()).await.unwrap();

        let interrupted = tokio::time::timeout(Duration::from_millis(100), session.close()).await;
        assert!(interrupted.is_err());
        drop(session);

        let stats = pool.stats();
        assert_eq!(stats.launched, 1);
        assert_eq!(stats.closed, 1);
        assert_eq!(stats.active, 0);
    }
}
