//! Cache-aside reads and detached cache maintenance.
//!
//! # Read path
//!
//! ```text
//! get(key) ─ hit ──────────────▶ deserialize ─ ok ─▶ return
//!    │                               │
//!    └ miss / error / timeout        └ corrupt
//!                 │                       │
//!                 ▼                       ▼
//!          Fetcher::fetch() (store) ──▶ return ──▶ spawn set(key, ttl)
//! ```
//!
//! # Write path
//!
//! Mutations hand their cache work to [`CacheAside::spawn_write`],
//! [`CacheAside::spawn_invalidate`] or [`CacheAside::spawn_pipeline`]. Each
//! runs as a detached task with its own deadline: it never inherits the
//! caller's cancellation, and its failures are logged, never returned.

use crate::error::{CacheError, Result};
use crate::providers::{CacheClient, CacheOp, CacheResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

/// Store fallback for one cached entity type.
pub trait Fetcher<T>: Send + Sync {
    /// Load the value from the authoritative store.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails.
    fn fetch(&self) -> impl Future<Output = Result<Option<T>>> + Send;
}

/// Cache-aside helper bound to one cache client.
#[derive(Debug, Clone)]
pub struct CacheAside<C> {
    cache: C,
    call_timeout: Duration,
    background_timeout: Duration,
}

impl<C> CacheAside<C>
where
    C: CacheClient + Clone + 'static,
{
    /// Wrap a cache client.
    ///
    /// * `call_timeout` - deadline for inline calls made on the request path
    /// * `background_timeout` - deadline for detached maintenance tasks
    #[must_use]
    pub const fn new(cache: C, call_timeout: Duration, background_timeout: Duration) -> Self {
        Self {
            cache,
            call_timeout,
            background_timeout,
        }
    }

    /// Borrow the underlying client.
    #[must_use]
    pub const fn client(&self) -> &C {
        &self.cache
    }

    /// Run an inline cache call under the call deadline.
    ///
    /// # Errors
    ///
    /// Returns the backend error, or [`CacheError::Timeout`].
    pub async fn call<T, F>(&self, fut: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .unwrap_or(Err(CacheError::Timeout))
    }

    /// Read and deserialize a cached value. Every failure is a miss.
    pub async fn read<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let raw = match self.call(self.cache.get(key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                metrics::counter!("voting.cache.miss").increment(1);
                tracing::debug!(key = %key, "Cache miss");
                return None;
            }
            Err(e) => {
                metrics::counter!("voting.cache.error", "op" => "get").increment(1);
                tracing::warn!(key = %key, error = %e, "Cache read failed, falling back to store");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                metrics::counter!("voting.cache.hit").increment(1);
                tracing::debug!(key = %key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                metrics::counter!("voting.cache.corrupt").increment(1);
                tracing::warn!(key = %key, error = %e, "Corrupt cache entry, falling back to store");
                None
            }
        }
    }

    /// Cache-aside read: cache first, then `fetcher`, then detached write-back.
    ///
    /// # Errors
    ///
    /// Returns error only if the fetcher (the store) fails.
    pub async fn get_or_fetch<T, F>(&self, key: &str, ttl: Duration, fetcher: &F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: Fetcher<T>,
    {
        if let Some(value) = self.read(key).await {
            return Ok(Some(value));
        }

        let fetched = fetcher.fetch().await?;
        if let Some(value) = &fetched {
            self.spawn_write(key, value, ttl);
        }
        Ok(fetched)
    }

    /// Serialize `value` and write it in the background.
    pub fn spawn_write<T>(&self, key: &str, value: &T, ttl: Duration)
    where
        T: Serialize + ?Sized,
    {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to serialize cache value");
                return;
            }
        };

        let cache = self.cache.clone();
        let key = key.to_string();
        self.spawn_detached("cache_write", async move {
            cache.set(&key, &payload, ttl).await
        });
    }

    /// Delete exact keys and glob patterns in the background.
    pub fn spawn_invalidate(&self, keys: Vec<String>, patterns: Vec<String>) {
        let cache = self.cache.clone();
        self.spawn_detached("cache_invalidate", async move {
            if !keys.is_empty() {
                cache.delete(&keys).await?;
            }
            for pattern in &patterns {
                let removed = cache.delete_pattern(pattern).await?;
                tracing::debug!(pattern = %pattern, removed = removed, "Pattern invalidated");
            }
            Ok(())
        });
    }

    /// Run an atomic batch in the background.
    pub fn spawn_pipeline(&self, ops: Vec<CacheOp>) {
        if ops.is_empty() {
            return;
        }
        let cache = self.cache.clone();
        self.spawn_detached("cache_pipeline", async move {
            cache.pipeline(ops).await.map(|_| ())
        });
    }

    fn spawn_detached<F>(&self, task: &'static str, fut: F)
    where
        F: Future<Output = CacheResult<()>> + Send + 'static,
    {
        let deadline = self.background_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(deadline, fut).await {
                Ok(Ok(())) => {
                    tracing::debug!(task = task, "Background cache task completed");
                }
                Ok(Err(e)) => {
                    metrics::counter!("voting.cache.background_failed", "task" => task)
                        .increment(1);
                    tracing::warn!(task = task, error = %e, "Background cache task failed");
                }
                Err(_) => {
                    metrics::counter!("voting.cache.background_timeout", "task" => task)
                        .increment(1);
                    tracing::warn!(
                        task = task,
                        timeout_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                        "Background cache task timed out"
                    );
                }
            }
        });
    }
}
