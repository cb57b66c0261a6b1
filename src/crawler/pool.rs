//! Fixed-size pool of page fetcher sessions
//!
//! Sessions are created once when the pool starts and reused for every
//! fetch. [`WorkerPool::acquire`] hands out a [`PooledFetcher`] guard; the
//! session goes back to the pool when the guard is dropped, whichever way the
//! borrowing task ends.

use crate::crawler::fetcher::{FetcherFactory, PageFetcher, SessionProfile};
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Errors returned by the pool
#[derive(Debug, Error)]
pub enum PoolError {
    /// No session could be started, so nothing can ever be acquired
    #[error("Worker pool has no sessions")]
    Empty,

    /// The pool is shutting down
    #[error("Worker pool is closed")]
    Closed,
}

struct PoolInner<F> {
    idle: Mutex<Vec<F>>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl<F> PoolInner<F> {
    fn checkin(&self, fetcher: F) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fetcher);
    }
}

/// Bounded pool of reusable fetcher sessions
pub struct WorkerPool<F> {
    inner: Arc<PoolInner<F>>,
}

impl<F> Clone for WorkerPool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: PageFetcher + 'static> WorkerPool<F> {
    /// Builds a pool from already started sessions
    pub fn from_fetchers(fetchers: Vec<F>) -> Self {
        let size = fetchers.len();
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(fetchers),
                permits: Arc::new(Semaphore::new(size)),
                size,
            }),
        }
    }

    /// Starts one session per profile
    ///
    /// A session that fails to start is logged and left out, so the pool may
    /// end up smaller than requested, possibly empty.
    pub async fn start<Fa>(factory: &Fa, profiles: &[SessionProfile]) -> Self
    where
        Fa: FetcherFactory<Fetcher = F>,
    {
        let mut fetchers = Vec::with_capacity(profiles.len());

        for (slot, profile) in profiles.iter().enumerate() {
            match factory.create(profile).await {
                Ok(fetcher) => {
                    tracing::debug!(
                        "Started session {} (user agent: {}, proxy: {:?})",
                        slot,
                        profile.user_agent,
                        profile.proxy
                    );
                    fetchers.push(fetcher);
                }
                Err(e) => {
                    tracing::error!("Session {} failed to start: {}", slot, e);
                }
            }
        }

        tracing::info!(
            "Worker pool ready with {}/{} sessions",
            fetchers.len(),
            profiles.len()
        );

        Self::from_fetchers(fetchers)
    }

    /// Number of sessions owned by the pool
    pub fn size(&self) -> usize {
        self.inner.size
    }

    pub fn is_empty(&self) -> bool {
        self.inner.size == 0
    }

    /// Number of sessions currently checked in
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Checks out a session, waiting until one is free
    pub async fn acquire(&self) -> Result<PooledFetcher<F>, PoolError> {
        if self.inner.size == 0 {
            return Err(PoolError::Empty);
        }

        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        let fetcher = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .ok_or(PoolError::Closed)?;

        Ok(PooledFetcher {
            fetcher: Some(fetcher),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Waits for every checked-out session to come back, then closes each once
    pub async fn shutdown(self) {
        let size = self.inner.size;
        if size == 0 {
            return;
        }

        let all = match Arc::clone(&self.inner.permits)
            .acquire_many_owned(size as u32)
            .await
        {
            Ok(permits) => permits,
            Err(_) => {
                tracing::warn!("Worker pool already closed");
                return;
            }
        };
        self.inner.permits.close();

        let fetchers: Vec<F> = std::mem::take(
            &mut *self
                .inner
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        drop(all);

        for (slot, fetcher) in fetchers.into_iter().enumerate() {
            if let Err(e) = fetcher.close().await {
                tracing::warn!("Failed to close session {}: {}", slot, e);
            }
        }

        tracing::debug!("Worker pool closed {} sessions", size);
    }
}

/// A session checked out of the pool
///
/// Derefs to the session; dropping the guard checks it back in.
pub struct PooledFetcher<F> {
    fetcher: Option<F>,
    pool: Arc<PoolInner<F>>,
    _permit: OwnedSemaphorePermit,
}

impl<F> Deref for PooledFetcher<F> {
    type Target = F;

    fn deref(&self) -> &F {
        // Only `drop` takes the session out.
        self.fetcher.as_ref().expect("pooled session present until drop")
    }
}

impl<F> Drop for PooledFetcher<F> {
    fn drop(&mut self) {
        if let Some(fetcher) = self.fetcher.take() {
            self.pool.checkin(fetcher);
        }
    }
}
