//! Browser Session Admission Control
//!
//! Sessions are never reused across requests. Each conversion launches a
//! fresh browser and tears it down afterwards. What this pool bounds is how
//! many of those browsers are alive at once.
//!
//! # Design
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        SessionPool                             │
//! │                                                                │
//! │  acquire() → SessionPermit → BrowserSession → close()/drop()   │
//! │      ↑                              ↓                          │
//! │  [waits for a free slot]    [record_launch / record_close]     │
//! │      ↓                              ↓                          │
//! │  [waiting++ / waiting--]    [slot released with the permit]    │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::conversion::ConversionError;

/// Bounded admission for browser sessions
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    permits: Arc<Semaphore>,
    max_sessions: usize,
    /// Browser processes started
    launched: AtomicUsize,
    /// Browser processes torn down
    closed: AtomicUsize,
    /// Requests queued for a slot
    waiting: AtomicUsize,
}

impl SessionPool {
    pub fn new(max_sessions: usize) -> Self {
        let max_sessions = max_sessions.max(1);
        Self {
            inner: Arc::new(PoolInner {
                permits: Arc::new(Semaphore::new(max_sessions)),
                max_sessions,
                launched: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                waiting: AtomicUsize::new(0),
            }),
        }
    }

    /// Wait for a free session slot
    ///
    /// The slot is held until the returned permit is dropped.
    pub async fn acquire(&self) -> Result<SessionPermit, ConversionError> {
        let permit = {
            let _waiting = WaitingGuard::enter(&self.inner.waiting);
            self.inner.permits.clone().acquire_owned().await
        };

        let permit = permit.map_err(|_| {
            ConversionError::UnknownConversionError("browser session pool is shut down".to_string())
        })?;

        Ok(SessionPermit {
            _permit: permit,
            pool: self.clone(),
        })
    }

    pub fn stats(&self) -> PoolStats {
        let launched = self.inner.launched.load(Ordering::Relaxed);
        let closed = self.inner.closed.load(Ordering::Relaxed);
        PoolStats {
            launched,
            closed,
            active: launched.saturating_sub(closed),
            waiting: self.inner.waiting.load(Ordering::Relaxed),
            max_sessions: self.inner.max_sessions,
        }
    }
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Keeps the waiting count right when an acquire is cancelled
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// RAII slot guard - frees the slot on drop
pub struct SessionPermit {
    _permit: OwnedSemaphorePermit,
    pool: SessionPool,
}

impl SessionPermit {
    pub(crate) fn record_launch(&self) {
        self.pool.inner.launched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_close(&self) {
        self.pool.inner.closed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Pool statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    /// Browser processes ever launched
    pub launched: usize,
    /// Browser processes torn down
    pub closed: usize,
    /// Currently running browser processes
    pub active: usize,
    /// Requests waiting for a slot
    pub waiting: usize,
    pub max_sessions: usize,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_permit_counts() {
        let pool = SessionPool::new(2);

        {
            let permit = pool.acquire().await.unwrap();
            permit.record_launch();
            let stats = pool.stats();
            assert_eq!(stats.launched, 1);
            assert_eq!(stats.active, 1);
            permit.record_close();
        }

        let stats = pool.stats();
        assert_eq!(stats.launched, 1);
        assert_eq!(stats.closed, 1);
        assert_eq!(stats.active, 0);
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let pool = SessionPool::new(2);

        let first = pool.acquire().await.unwrap();
        let _second = pool.acquire().await.unwrap();

        // Third request has to queue
        let queued = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
        assert!(queued.is_err());

        drop(first);
        let third = tokio::time::timeout(Duration::from_millis(500), pool.acquire()).await;
        assert!(third.is_ok());
    }

    #[test]
    fn test_zero_size_pool_still_admits() {
        let pool = SessionPool::new(0);
        assert_eq!(pool.stats().max_sessions, 1);
    }
}
