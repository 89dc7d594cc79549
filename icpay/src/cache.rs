//! Session-scoped caches.
//!
//! The payment destination and the payer account rarely change during a
//! session, so they are fetched once and reused. Every entry can be dropped
//! and re-fetched at any time.

use std::future::Future;

use tokio::sync::RwLock;

use crate::principal::Principal;
use crate::sources::AccountInfo;

/// A single lazily-filled value.
///
/// No lock is held while fetching. Concurrent misses may both fetch; the
/// last write wins and either value is valid.
#[derive(Debug)]
pub struct CacheSlot<T> {
    value: RwLock<Option<T>>,
}

impl<T> Default for CacheSlot<T> {
    fn default() -> Self {
        Self {
            value: RwLock::new(None),
        }
    }
}

impl<T: Clone> CacheSlot<T> {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value, if any.
    pub async fn get(&self) -> Option<T> {
        self.value.read().await.clone()
    }

    /// Stores `value`.
    pub async fn set(&self, value: T) {
        *self.value.write().await = Some(value);
    }

    /// Drops the cached value.
    pub async fn clear(&self) {
        *self.value.write().await = None;
    }

    /// Returns the cached value or fills the slot with `fetch`.
    ///
    /// # Errors
    ///
    /// Returns the error of `fetch`; the slot stays empty.
    pub async fn get_or_try_fill<F, Fut, E>(&self, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get().await {
            return Ok(value);
        }
        let value = fetch().await?;
        self.set(value.clone()).await;
        Ok(value)
    }
}

/// Caches shared by all payments of one client.
#[derive(Debug, Default)]
pub struct SessionCache {
    /// Where transfers are sent.
    pub platform_canister: CacheSlot<Principal>,
    /// The payer account.
    pub account: CacheSlot<AccountInfo>,
}

impl SessionCache {
    /// Creates empty caches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every cached entry.
    pub async fn clear(&self) {
        self.platform_canister.clear().await;
        self.account.clear().await;
    }
}
