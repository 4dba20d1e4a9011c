//! Store contract consumed by every recipe.
//!
//! Recipes know nothing about durability or isolation internals. They need
//! single-key atomic operations plus one transactional unit of work for
//! read-modify-write sequences, and they encode their state as JSON strings.

pub mod inmemory;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::WriteOptions;
use crate::error::CoordinationError;
use crate::error::StoreError;

/// Shared key-value store interface.
///
/// Every operation is individually atomic against all other users of the
/// store. `retry` controls what happens while the store is busy with another
/// transaction: wait and try again (`true`), or fail with
/// [`StoreError::Timeout`] once the store's busy timeout elapses (`false`).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Absent and expired keys read as `None`.
    async fn get(&self, key: &str, retry: bool) -> Result<Option<String>, StoreError>;

    /// Unconditionally write a value.
    async fn set(&self, key: &str, value: String, options: &WriteOptions, retry: bool) -> Result<bool, StoreError>;

    /// Write a value only if the key is absent. Returns whether it was written.
    async fn add(&self, key: &str, value: String, options: &WriteOptions, retry: bool) -> Result<bool, StoreError>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str, retry: bool) -> Result<bool, StoreError>;

    /// Atomically read and remove a key.
    async fn pop(&self, key: &str, retry: bool) -> Result<Option<String>, StoreError>;

    /// Begin a transaction.
    ///
    /// Operations on the returned handle are isolated from every other
    /// transaction and become visible together on [`Transaction::commit`].
    /// Dropping the handle without committing discards them.
    async fn transact(&self, retry: bool) -> Result<Box<dyn Transaction>, StoreError>;
}

/// A unit of work opened by [`KeyValueStore::transact`].
#[async_trait]
pub trait Transaction: Send {
    /// Read a value, observing this transaction's own uncommitted writes.
    async fn get(&mut self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stage an unconditional write.
    async fn set(&mut self, key: &str, value: String, options: &WriteOptions) -> Result<(), StoreError>;

    /// Stage a delete. Returns whether the key existed.
    async fn delete(&mut self, key: &str) -> Result<bool, StoreError>;

    /// Publish all staged operations atomically.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard all staged operations.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

// Blanket implementation for Arc<T>
#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    async fn get(&self, key: &str, retry: bool) -> Result<Option<String>, StoreError> {
        (**self).get(key, retry).await
    }

    async fn set(&self, key: &str, value: String, options: &WriteOptions, retry: bool) -> Result<bool, StoreError> {
        (**self).set(key, value, options, retry).await
    }

    async fn add(&self, key: &str, value: String, options: &WriteOptions, retry: bool) -> Result<bool, StoreError> {
        (**self).add(key, value, options, retry).await
    }

    async fn delete(&self, key: &str, retry: bool) -> Result<bool, StoreError> {
        (**self).delete(key, retry).await
    }

    async fn pop(&self, key: &str, retry: bool) -> Result<Option<String>, StoreError> {
        (**self).pop(key, retry).await
    }

    async fn transact(&self, retry: bool) -> Result<Box<dyn Transaction>, StoreError> {
        (**self).transact(retry).await
    }
}

/// Decode a stored JSON value into a recipe's state.
pub(crate) fn decode<T: DeserializeOwned>(key: &str, raw: Option<String>) -> Result<Option<T>, CoordinationError> {
    match raw {
        None => Ok(None),
        Some(json) => serde_json::from_str(&json).map(Some).map_err(|e| CoordinationError::CorruptedData {
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Encode a recipe's state as JSON.
pub(crate) fn encode<T: Serialize>(value: &T) -> Result<String, CoordinationError> {
    Ok(serde_json::to_string(value)?)
}
