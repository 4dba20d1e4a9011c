//! Running average shared across tasks, threads and processes.

use std::sync::Arc;

use tracing::debug;

use crate::config::RecipeConfig;
use crate::config::WriteOptions;
use crate::error::CoordinationError;
use crate::pure::compute_average;
use crate::store::KeyValueStore;
use crate::store::decode;
use crate::store::encode;
use crate::types::AverageState;

/// Online mean over a shared `(total, count)` pair.
///
/// # Example
///
/// ```ignore
/// let nightly = Averager::new(store, "nightly-job", RecipeConfig::default())?;
/// nightly.add(0.080).await?;
/// nightly.add(0.120).await?;
/// assert!((nightly.get().await? - 0.1).abs() < 1e-9);
/// ```
pub struct Averager<S: KeyValueStore + ?Sized> {
    store: Arc<S>,
    key: String,
    config: RecipeConfig,
    options: WriteOptions,
}

impl<S: KeyValueStore + ?Sized> Clone for Averager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            key: self.key.clone(),
            config: self.config.clone(),
            options: self.options.clone(),
        }
    }
}

impl<S: KeyValueStore + ?Sized> Averager<S> {
    /// Create an averager handle.
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

    /// Record one sample.
    pub async fn add(&self, value: f64) -> Result<(), CoordinationError> {
        let mut txn = self.store.transact(self.config.retry).await?;
        let state: AverageState = decode(&self.key, txn.get(&self.key).await?)?.unwrap_or_default();

        let updated = AverageState {
            total: state.total + value,
            count: state.count.saturating_add(1),
        };
        txn.set(&self.key, encode(&updated)?, &self.options).await?;
        txn.commit().await?;

        debug!(key = %self.key, value, count = updated.count, "averager sample added");
        Ok(())
    }

    /// Current average, `0.0` with no samples.
    pub async fn get(&self) -> Result<f64, CoordinationError> {
        let raw = self.store.get(&self.key, self.config.retry).await?;
        let state: AverageState = decode(&self.key, raw)?.unwrap_or_default();
        Ok(compute_average(state.total, state.count))
    }

    /// Return the current average and reset to no samples.
    pub async fn pop(&self) -> Result<f64, CoordinationError> {
        let raw = self.store.pop(&self.key, self.config.retry).await?;
        let state: AverageState = decode(&self.key, raw)?.unwrap_or_default();
        debug!(key = %self.key, count = state.count, "averager reset");
        Ok(compute_average(state.total, state.count))
    }

    /// Get the averager key.
    pub fn key(&self) -> &str {
        &self.key
    }
}
