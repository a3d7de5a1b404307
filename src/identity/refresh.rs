//! Read-mostly cache for provider-issued app credentials (access tokens,
//! tickets) with soft and hard expiry.
//!
//! A credential issued with lifetime `L` is hard-expired at `0.9 L` and due
//! for refresh at `0.8 L`. Readers past the hard expiry refresh synchronously;
//! readers between the two thresholds get the current value while a single
//! background refresh runs.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::AuthError;

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedCredential {
    pub expires_in_seconds: u64,
    pub value: String,
}

#[async_trait]
pub trait CredentialFetcher: Send + Sync {
    async fn fetch(&self) -> Result<FetchedCredential, AuthError>;
}

#[derive(Debug, Clone)]
struct Cached {
    expires_at: DateTime<Utc>,
    refresh_at: DateTime<Utc>,
    value: String,
}

impl Cached {
    fn new(fetched: FetchedCredential, now: DateTime<Utc>) -> Self {
        let lifetime_ms = i64::try_from(fetched.expires_in_seconds.saturating_mul(1000))
            .unwrap_or(i64::MAX);
        Self {
            expires_at: offset(now, lifetime_ms / 10 * 9),
            refresh_at: offset(now, lifetime_ms / 10 * 8),
            value: fetched.value,
        }
    }
}

/// `now + ms`, clamped to the latest representable instant.
fn offset(now: DateTime<Utc>, ms: i64) -> DateTime<Utc> {
    Duration::try_milliseconds(ms)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

struct Inner {
    current: RwLock<Option<Cached>>,
    fetcher: Arc<dyn CredentialFetcher>,
    name: &'static str,
    refreshing: AtomicBool,
}

#[derive(Clone)]
pub struct CredentialCache {
    inner: Arc<Inner>,
}

impl CredentialCache {
    pub fn new(name: &'static str, fetcher: Arc<dyn CredentialFetcher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                current: RwLock::new(None),
                fetcher,
                name,
                refreshing: AtomicBool::new(false),
            }),
        }
    }

    pub async fn get(&self) -> Result<String, AuthError> {
        self.get_at(Utc::now()).await
    }

    async fn get_at(&self, now: DateTime<Utc>) -> Result<String, AuthError> {
        {
            let current = self.inner.current.read().await;
            if let Some(cached) = current.as_ref() {
                if now < cached.refresh_at {
                    return Ok(cached.value.clone());
                }
                if now < cached.expires_at {
                    self.spawn_refresh();
                    return Ok(cached.value.clone());
                }
            }
        }
        self.refresh_blocking(now).await
    }

    async fn refresh_blocking(&self, now: DateTime<Utc>) -> Result<String, AuthError> {
        let mut current = self.inner.current.write().await;
        // Another reader may have refreshed while we waited for the lock.
        if let Some(cached) = current.as_ref() {
            if now < cached.expires_at {
                return Ok(cached.value.clone());
            }
        }

        let fetched = self.inner.fetcher.fetch().await?;
        let cached = Cached::new(fetched, Utc::now());
        let value = cached.value.clone();
        *current = Some(cached);
        tracing::debug!(credential = self.inner.name, "Credential refreshed");
        Ok(value)
    }

    fn spawn_refresh(&self) {
        if self
            .inner
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            match inner.fetcher.fetch().await {
                Ok(fetched) => {
                    *inner.current.write().await = Some(Cached::new(fetched, Utc::now()));
                    tracing::debug!(credential = inner.name, "Credential refreshed in background");
                }
                Err(e) => {
                    tracing::warn!(credential = inner.name, error = %e, "Background credential refresh failed");
                }
            }
            inner.refreshing.store(false, Ordering::Release);
        });
    }

    #[cfg(test)]
    async fn peek(&self) -> Option<String> {
        self.inner.current.read().await.as_ref().map(|c| c.value.clone())
    }
}
