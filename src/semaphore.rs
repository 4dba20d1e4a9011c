//! Bounded counting semaphore shared across tasks, threads and processes.
//!
//! The key stores the number of available permits. A missing key means every
//! permit is free. Acquire decrements while the count is positive; release
//! increments but never past the initial value, so a stray release fails
//! instead of silently widening the bound.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::RecipeConfig;
use crate::config::WriteOptions;
use crate::constants::DEFAULT_SEMAPHORE_VALUE;
use crate::error::CoordinationError;
use crate::guard::Guard;
use crate::guard::Lockable;
use crate::pure::can_return_permit;
use crate::pure::can_take_permit;
use crate::spin::SpinWait;
use crate::store::KeyValueStore;
use crate::store::decode;
use crate::store::encode;

/// A cross-context semaphore with a fixed upper bound.
///
/// Permits are not tied to an owner: any handle may release a permit taken
/// by another, as long as the bound holds.
pub struct BoundedSemaphore<S: KeyValueStore + ?Sized> {
    store: Arc<S>,
    key: String,
    value: u32,
    config: RecipeConfig,
    options: WriteOptions,
}

impl<S: KeyValueStore + ?Sized> Clone for BoundedSemaphore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            key: self.key.clone(),
            value: self.value,
            config: self.config.clone(),
            options: self.options.clone(),
        }
    }
}

impl<S: KeyValueStore + ?Sized + 'static> BoundedSemaphore<S> {
    /// Create a semaphore handle with `value` permits.
    ///
    /// Every handle sharing `key` must use the same `value`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `value` is zero.
    pub fn new(store: Arc<S>, key: impl Into<String>, value: u32, config: RecipeConfig) -> Result<Self, CoordinationError> {
        if value == 0 {
            return Err(CoordinationError::InvalidConfig {
                reason: "semaphore value must be at least 1".to_string(),
            });
        }
        config.validate()?;
        let options = config.write_options();
        Ok(Self {
            store,
            key: key.into(),
            value,
            config,
            options,
        })
    }

    /// Create a semaphore handle with the default single permit.
    pub fn with_default_value(store: Arc<S>, key: impl Into<String>, config: RecipeConfig) -> Result<Self, CoordinationError> {
        Self::new(store, key, DEFAULT_SEMAPHORE_VALUE, config)
    }

    /// Take a permit, polling while none is available.
    pub async fn acquire(&self) -> Result<(), CoordinationError> {
        let mut spin = SpinWait::new(&self.config);
        loop {
            if self.try_acquire().await? {
                return Ok(());
            }
            spin.wait(&self.key).await;
        }
    }

    /// Try to take a permit once without waiting.
    pub async fn try_acquire(&self) -> Result<bool, CoordinationError> {
        let mut txn = self.store.transact(self.config.retry).await?;
        let available: u32 = decode(&self.key, txn.get(&self.key).await?)?.unwrap_or(self.value);

        if !can_take_permit(available) {
            txn.rollback().await?;
            return Ok(false);
        }

        let remaining = available - 1;
        txn.set(&self.key, encode(&remaining)?, &self.options).await?;
        txn.commit().await?;

        debug!(key = %self.key, remaining, "semaphore permit acquired");
        Ok(true)
    }

    /// Return a permit.
    ///
    /// Fails with [`CoordinationError::ReleaseWithoutOwnership`] if every
    /// permit is already available.
    pub async fn release(&self) -> Result<(), CoordinationError> {
        let mut txn = self.store.transact(self.config.retry).await?;
        let available: u32 = decode(&self.key, txn.get(&self.key).await?)?.unwrap_or(self.value);

        if !can_return_permit(available, self.value) {
            txn.rollback().await?;
            return Err(CoordinationError::ReleaseWithoutOwnership {
                key: self.key.clone(),
                reason: "cannot release un-acquired semaphore".to_string(),
            });
        }

        let remaining = available + 1;
        txn.set(&self.key, encode(&remaining)?, &self.options).await?;
        txn.commit().await?;

        debug!(key = %self.key, remaining, "semaphore permit released");
        Ok(())
    }

    /// Number of permits currently available.
    pub async fn available(&self) -> Result<u32, CoordinationError> {
        let raw = self.store.get(&self.key, self.config.retry).await?;
        Ok(decode(&self.key, raw)?.unwrap_or(self.value))
    }

    /// Take a permit and return a guard that gives it back.
    pub async fn lock(&self) -> Result<Guard<Self>, CoordinationError> {
        Guard::acquire(self).await
    }

    /// The configured number of permits.
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Get the semaphore key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl<S: KeyValueStore + ?Sized + 'static> Lockable for BoundedSemaphore<S> {
    async fn acquire(&self) -> Result<(), CoordinationError> {
        BoundedSemaphore::acquire(self).await
    }

    async fn release(&self) -> Result<(), CoordinationError> {
        BoundedSemaphore::release(self).await
    }

    fn key(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::inmemory::InMemoryStore;

    #[tokio::test]
    async fn test_zero_value_rejected() {
        let store = InMemoryStore::new();
        let result = BoundedSemaphore::new(store, "pool", 0, RecipeConfig::default());
        assert!(matches!(result, Err(CoordinationError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_default_value_is_one_permit() {
        let store = InMemoryStore::new();
        let sem = BoundedSemaphore::with_default_value(store, "pool", RecipeConfig::default()).unwrap();
        assert_eq!(sem.value(), 1);
        assert!(sem.try_acquire().await.unwrap());
        assert!(!sem.try_acquire().await.unwrap());
    }

    #[tokio::test]
    async fn test_semaphore_bound() {
        let store = InMemoryStore::new();
        let sem = BoundedSemaphore::new(store, "pool", 3, RecipeConfig::default()).unwrap();

        assert_eq!(sem.available().await.unwrap(), 3);
        for _ in 0..3 {
            assert!(sem.try_acquire().await.unwrap());
        }
        assert!(!sem.try_acquire().await.unwrap());
        assert_eq!(sem.available().await.unwrap(), 0);

        sem.release().await.unwrap();
        assert!(sem.try_acquire().await.unwrap());
    }

    #[tokio::test]
    async fn test_release_past_bound_fails() {
        let store = InMemoryStore::new();
        let sem = BoundedSemaphore::new(store, "pool", 2, RecipeConfig::default()).unwrap();

        let err = sem.release().await.unwrap_err();
        assert!(matches!(err, CoordinationError::ReleaseWithoutOwnership { .. }));
        assert!(err.to_string().contains("cannot release un-acquired semaphore"));

        sem.acquire().await.unwrap();
        sem.release().await.unwrap();
        assert!(sem.release().await.is_err());
        assert_eq!(sem.available().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_permit_released_by_other_handle() {
        let store = InMemoryStore::new();
        let a = BoundedSemaphore::new(store.clone(), "pool", 1, RecipeConfig::default()).unwrap();
        let b = BoundedSemaphore::new(store, "pool", 1, RecipeConfig::default()).unwrap();

        a.acquire().await.unwrap();
        assert!(!b.try_acquire().await.unwrap());
        b.release().await.unwrap();
        assert!(b.try_acquire().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_permit() {
        let store = InMemoryStore::new();
        let sem = BoundedSemaphore::new(store, "pool", 1, RecipeConfig::default()).unwrap();
        let guard = sem.lock().await.unwrap();

        let waiter = {
            let sem = sem.clone();
            tokio::spawn(async move { sem.acquire().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        guard.release().await.unwrap();
        waiter.await.unwrap().unwrap();
        assert_eq!(sem.available().await.unwrap(), 0);
    }
}
