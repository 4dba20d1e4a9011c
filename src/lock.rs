//! Non-reentrant lock shared across tasks, threads and processes.
//!
//! The lock is held while its key exists. Acquisition is a spin loop around
//! the store's atomic create-if-absent (`add`); release deletes the key.
//!
//! Release does not check who holds the lock: releasing a lock held by
//! someone else, or not held at all, clears the key. The latter case is
//! logged at `warn`. Use [`RLock`](crate::RLock) when ownership must be
//! enforced.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use tracing::warn;

use crate::config::RecipeConfig;
use crate::config::WriteOptions;
use crate::constants::LOCK_SENTINEL;
use crate::error::CoordinationError;
use crate::guard::Guard;
use crate::guard::Lockable;
use crate::spin::SpinWait;
use crate::store::KeyValueStore;

/// A cross-context mutex keyed by name.
///
/// Unfair: waiters poll and whichever `add` lands first wins.
pub struct Lock<S: KeyValueStore + ?Sized> {
    store: Arc<S>,
    key: String,
    config: RecipeConfig,
    options: WriteOptions,
}

impl<S: KeyValueStore + ?Sized> Clone for Lock<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            key: self.key.clone(),
            config: self.config.clone(),
            options: self.options.clone(),
        }
    }
}

impl<S: KeyValueStore + ?Sized + 'static> Lock<S> {
    /// Create a lock handle.
    ///
    /// # Arguments
    /// * `store` - The underlying key-value store
    /// * `key` - The lock key (should be unique per resource)
    /// * `config` - Expiry, tag and polling configuration
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `config` fails validation.
    pub fn new(store: Arc<S>, key: impl Into<String>, config: RecipeConfig) -> Result<Self, CoordinationError> {
        config.validate()?;
        let options = config.write_options();
        Ok(Self {
            store,
            key: key.into(),
            config,
            options,
        })
    }

    /// Acquire the lock, polling until the key is absent.
    ///
    /// Never times out. Wrap in `tokio::time::timeout` to bound the wait.
    pub async fn acquire(&self) -> Result<(), CoordinationError> {
        let mut spin = SpinWait::new(&self.config);
        loop {
            if self.try_acquire().await? {
                return Ok(());
            }
            spin.wait(&self.key).await;
        }
    }

    /// Try to acquire the lock once without waiting.
    pub async fn try_acquire(&self) -> Result<bool, CoordinationError> {
        let added = self
            .store
            .add(&self.key, LOCK_SENTINEL.to_string(), &self.options, self.config.retry)
            .await?;
        if added {
            debug!(key = %self.key, expire_ms = ?self.options.expire_ms, "lock acquired");
        }
        Ok(added)
    }

    /// Release the lock by deleting its key.
    pub async fn release(&self) -> Result<(), CoordinationError> {
        let existed = self.store.delete(&self.key, self.config.retry).await?;
        if existed {
            debug!(key = %self.key, "lock released");
        } else {
            warn!(key = %self.key, "lock released while not held");
        }
        Ok(())
    }

    /// Check whether anyone currently holds the lock.
    pub async fn is_locked(&self) -> Result<bool, CoordinationError> {
        Ok(self.store.get(&self.key, self.config.retry).await?.is_some())
    }

    /// Acquire the lock and return a guard that releases it.
    pub async fn lock(&self) -> Result<Guard<Self>, CoordinationError> {
        Guard::acquire(self).await
    }

    /// Get the lock key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl<S: KeyValueStore + ?Sized + 'static> Lockable for Lock<S> {
    async fn acquire(&self) -> Result<(), CoordinationError> {
        Lock::acquire(self).await
    }

    async fn release(&self) -> Result<(), CoordinationError> {
        Lock::release(self).await
    }

    fn key(&self) -> &str {
        &self.key
    }
}
