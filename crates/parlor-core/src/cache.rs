//! Short-TTL response cache
//!
//! Wraps moka with per-entry deadlines and single-flight computes: while one
//! caller computes a key, concurrent callers for the same key wait for that
//! result instead of recomputing. Writes invalidate by key prefix before the
//! write is acknowledged, so a client that immediately re-reads never sees
//! stale data.

use crate::error::GatewayError;
use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default capacity for response caches
const CACHE_CAPACITY_DEFAULT: u64 = 10_000;

#[derive(Debug, Clone)]
struct CacheSlot<V> {
    value: V,
    expires_at: Instant,
}

/// Keyed response cache with per-entry TTL
#[derive(Debug, Clone)]
pub struct ResponseCache<V: Clone + Send + Sync + 'static> {
    inner: Cache<String, CacheSlot<V>>,
}

impl<V: Clone + Send + Sync + 'static> ResponseCache<V> {
    /// Create a cache with the default capacity
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(CACHE_CAPACITY_DEFAULT)
    }

    /// Create a cache with max capacity
    #[must_use]
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .support_invalidation_closures()
                .build(),
        }
    }

    /// Serve the key from cache, computing on miss or expiry
    ///
    /// `compute` runs exactly once per key even under concurrent callers;
    /// the others wait for its result. A failed compute is not cached, so
    /// the next caller retries.
    ///
    /// # Errors
    /// Propagates the compute's error.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<V, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, GatewayError>>,
    {
        if let Some(slot) = self.inner.get(key).await {
            if Instant::now() < slot.expires_at {
                tracing::debug!("cache hit for {}", key);
                return Ok(slot.value);
            }
            // Expired: drop it so the entry API recomputes below.
            self.inner.invalidate(key).await;
        }

        let entry = self
            .inner
            .entry_by_ref(key)
            .or_try_insert_with(async move {
                let value = compute().await?;
                Ok(CacheSlot {
                    value,
                    expires_at: Instant::now() + ttl,
                })
            })
            .await
            .map_err(|e: Arc<GatewayError>| e.as_ref().clone())?;

        Ok(entry.into_value().value)
    }

    /// Invalidate every key under the given prefix
    ///
    /// Entries present before this call are guaranteed not to be served
    /// afterwards; physical removal is deferred.
    pub fn invalidate_prefix(&self, prefix: &str) {
        let prefix = prefix.to_string();
        if let Err(e) = self
            .inner
            .invalidate_entries_if(move |key, _| key.starts_with(&prefix))
        {
            tracing::error!("prefix invalidation failed: {}", e);
        }
    }

    /// Invalidate a single key
    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    /// Drop every entry
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Approximate number of entries
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl<V: Clone + Send + Sync + 'static> Default for ResponseCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
