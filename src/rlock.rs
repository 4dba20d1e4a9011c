//! Reentrant lock shared across tasks, threads and processes.
//!
//! The stored state is `(owner, depth)`. The holder identified by its
//! [`OwnerToken`] may acquire again, incrementing the depth, and must release
//! as many times before anyone else can acquire. Both the check and the
//! update run inside one store transaction so two contenders can never both
//! observe `depth == 0` and both win.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::RecipeConfig;
use crate::config::WriteOptions;
use crate::error::CoordinationError;
use crate::guard::Guard;
use crate::guard::Lockable;
use crate::pure::can_acquire_reentrant;
use crate::pure::is_owned_by;
use crate::spin::SpinWait;
use crate::store::KeyValueStore;
use crate::store::decode;
use crate::store::encode;
use crate::types::OwnerToken;
use crate::types::RLockState;

/// A cross-context reentrant mutex.
///
/// Ownership belongs to the handle's token, not to a thread: clones of a
/// handle share the token and therefore the ownership.
pub struct RLock<S: KeyValueStore + ?Sized> {
    store: Arc<S>,
    key: String,
    owner: OwnerToken,
    config: RecipeConfig,
    options: WriteOptions,
}

impl<S: KeyValueStore + ?Sized> Clone for RLock<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            key: self.key.clone(),
            owner: self.owner.clone(),
            config: self.config.clone(),
            options: self.options.clone(),
        }
    }
}

impl<S: KeyValueStore + ?Sized + 'static> RLock<S> {
    /// Create a handle with a freshly generated owner token.
    pub fn new(store: Arc<S>, key: impl Into<String>, config: RecipeConfig) -> Result<Self, CoordinationError> {
        Self::with_owner(store, key, OwnerToken::generate(), config)
    }

    /// Create a handle acting as `owner`.
    ///
    /// Handles created with equal tokens are the same owner.
    pub fn with_owner(
        store: Arc<S>,
        key: impl Into<String>,
        owner: OwnerToken,
        config: RecipeConfig,
    ) -> Result<Self, CoordinationError> {
        config.validate()?;
        let options = config.write_options();
        Ok(Self {
            store,
            key: key.into(),
            owner,
            config,
            options,
        })
    }

    /// Acquire the lock, polling while another owner holds it.
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
        let mut txn = self.store.transact(self.config.retry).await?;
        let state: RLockState = decode(&self.key, txn.get(&self.key).await?)?.unwrap_or_default();

        if !can_acquire_reentrant(state.owner.as_deref(), state.depth, self.owner.as_str()) {
            txn.rollback().await?;
            return Ok(false);
        }

        let depth = state.depth.saturating_add(1);
        let new_state = RLockState {
            owner: Some(self.owner.as_str().to_string()),
            depth,
        };
        txn.set(&self.key, encode(&new_state)?, &self.options).await?;
        txn.commit().await?;

        debug!(key = %self.key, owner = %self.owner, depth, "rlock acquired");
        Ok(true)
    }

    /// Release one level of ownership.
    ///
    /// Fails with [`CoordinationError::ReleaseWithoutOwnership`] if this
    /// handle's owner does not hold the lock.
    pub async fn release(&self) -> Result<(), CoordinationError> {
        let mut txn = self.store.transact(self.config.retry).await?;
        let state: RLockState = decode(&self.key, txn.get(&self.key).await?)?.unwrap_or_default();

        if !is_owned_by(state.owner.as_deref(), state.depth, self.owner.as_str()) {
            txn.rollback().await?;
            return Err(CoordinationError::ReleaseWithoutOwnership {
                key: self.key.clone(),
                reason: "cannot release un-acquired lock".to_string(),
            });
        }

        let depth = state.depth - 1;
        let new_state = RLockState {
            owner: state.owner,
            depth,
        };
        txn.set(&self.key, encode(&new_state)?, &self.options).await?;
        txn.commit().await?;

        debug!(key = %self.key, owner = %self.owner, depth, "rlock released");
        Ok(())
    }

    /// Current reentrancy depth, whoever holds it. Zero when free.
    pub async fn depth(&self) -> Result<u32, CoordinationError> {
        Ok(self.read_state().await?.depth)
    }

    /// Current holder, if held.
    pub async fn owner(&self) -> Result<Option<OwnerToken>, CoordinationError> {
        let state = self.read_state().await?;
        Ok(state.owner.filter(|_| state.depth > 0).map(OwnerToken::new))
    }

    /// Acquire one level and return a guard that releases it.
    pub async fn lock(&self) -> Result<Guard<Self>, CoordinationError> {
        Guard::acquire(self).await
    }

    /// This handle's owner token.
    pub fn owner_token(&self) -> &OwnerToken {
        &self.owner
    }

    /// Get the lock key.
    pub fn key(&self) -> &str {
        &self.key
    }

    async fn read_state(&self) -> Result<RLockState, CoordinationError> {
        let raw = self.store.get(&self.key, self.config.retry).await?;
        Ok(decode(&self.key, raw)?.unwrap_or_default())
    }
}

#[async_trait]
impl<S: KeyValueStore + ?Sized + 'static> Lockable for RLock<S> {
    async fn acquire(&self) -> Result<(), CoordinationError> {
        RLock::acquire(self).await
    }

    async fn release(&self) -> Result<(), CoordinationError> {
        RLock::release(self).await
    }

    fn key(&self) -> &str {
        &self.key
    }
}
