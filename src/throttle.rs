//! Token-bucket rate limiting shared across tasks, threads and processes.
//!
//! At most `count` calls per `seconds`, smoothed continuously: permits refill
//! at `count / seconds` per second up to a capacity of `count`. The bucket
//! state `(last, tally)` lives under the throttle key, so every handle on the
//! same key draws from one budget.
//!
//! # Example
//!
//! ```ignore
//! let fetch = throttle(store, ThrottleConfig::new(10, 1.0), |url: String| async move {
//!     reqwest::get(url).await
//! })
//! .await?;
//!
//! // At most ten requests per second across every process sharing the store
//! let response = fetch("https://example.com".to_string()).await??;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::clock::SystemClock;
use crate::config::RecipeConfig;
use crate::config::WriteOptions;
use crate::error::CoordinationError;
use crate::pure::ThrottleDecision;
use crate::pure::compute_throttle_decision;
use crate::pure::refill_rate;
use crate::store::KeyValueStore;
use crate::store::decode;
use crate::store::encode;
use crate::types::BucketState;
use crate::types::full_name;

/// Configuration for a throttle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Bucket capacity: calls allowed per window.
    pub count: u64,
    /// Window length in seconds.
    pub seconds: f64,
    /// Store key. Defaults to the wrapped callable's type name.
    #[serde(default)]
    pub name: Option<String>,
    /// Expiry, tag and retry settings for the bucket entry.
    #[serde(default)]
    pub recipe: RecipeConfig,
}

impl ThrottleConfig {
    /// Allow `count` calls per `seconds`.
    pub fn new(count: u64, seconds: f64) -> Self {
        Self {
            count,
            seconds,
            name: None,
            recipe: RecipeConfig::default(),
        }
    }

    /// Set an explicit store key.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the recipe configuration.
    pub fn with_recipe(mut self, recipe: RecipeConfig) -> Self {
        self.recipe = recipe;
        self
    }

    /// Check the rate is usable.
    pub fn validate(&self) -> Result<(), CoordinationError> {
        if self.count == 0 {
            return Err(CoordinationError::InvalidConfig {
                reason: "throttle count must be at least 1".to_string(),
            });
        }
        if !self.seconds.is_finite() || self.seconds <= 0.0 {
            return Err(CoordinationError::InvalidConfig {
                reason: format!("throttle seconds must be positive and finite, got {}", self.seconds),
            });
        }
        self.recipe.validate()
    }
}

/// A handle on a shared token bucket.
pub struct Throttle<S: KeyValueStore + ?Sized> {
    store: Arc<S>,
    key: String,
    count: u64,
    seconds: f64,
    config: RecipeConfig,
    options: WriteOptions,
    clock: Arc<dyn Clock>,
}

impl<S: KeyValueStore + ?Sized> Clone for Throttle<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            key: self.key.clone(),
            count: self.count,
            seconds: self.seconds,
            config: self.config.clone(),
            options: self.options.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: KeyValueStore + ?Sized + 'static> Throttle<S> {
    /// Create a throttle on `key` and fill its bucket.
    ///
    /// Construction resets the shared bucket to full, so create handles
    /// once at startup rather than per call.
    pub async fn new(store: Arc<S>, key: impl Into<String>, config: ThrottleConfig) -> Result<Self, CoordinationError> {
        Self::with_clock(store, key, config, Arc::new(SystemClock)).await
    }

    /// Create a throttle that measures and sleeps through `clock`.
    pub async fn with_clock(
        store: Arc<S>,
        key: impl Into<String>,
        config: ThrottleConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoordinationError> {
        config.validate()?;
        let options = config.recipe.write_options();
        let throttle = Self {
            store,
            key: key.into(),
            count: config.count,
            seconds: config.seconds,
            config: config.recipe,
            options,
            clock,
        };

        let full = BucketState::full(throttle.clock.now(), throttle.count);
        throttle.store.set(&throttle.key, encode(&full)?, &throttle.options, throttle.config.retry).await?;
        debug!(key = %throttle.key, count = throttle.count, seconds = throttle.seconds, "throttle created");
        Ok(throttle)
    }

    /// Wait until a permit is available and consume it.
    pub async fn wait(&self) -> Result<(), CoordinationError> {
        loop {
            let mut txn = self.store.transact(self.config.retry).await?;
            let now = self.clock.now();
            let state = match decode::<BucketState>(&self.key, txn.get(&self.key).await?)? {
                Some(state) => state,
                // Expired or evicted: start over with a full bucket
                None => BucketState::full(now, self.count),
            };
            if !state.last.is_finite() || !state.tally.is_finite() {
                txn.rollback().await?;
                return Err(CoordinationError::CorruptedData {
                    key: self.key.clone(),
                    reason: format!("non-finite bucket state {:?}", state),
                });
            }

            match compute_throttle_decision(state.last, state.tally, now, self.count, self.seconds) {
                ThrottleDecision::Proceed { tally } => {
                    let updated = BucketState { last: now, tally };
                    txn.set(&self.key, encode(&updated)?, &self.options).await?;
                    txn.commit().await?;
                    debug!(key = %self.key, tally, "throttle permit consumed");
                    return Ok(());
                }
                ThrottleDecision::Wait { delay_secs } => {
                    txn.rollback().await?;
                    let delay = Duration::try_from_secs_f64(delay_secs)
                        .map_err(|e| CoordinationError::CorruptedData {
                            key: self.key.clone(),
                            reason: format!("invalid throttle delay {delay_secs}: {e}"),
                        })?
                        // Sub-nanosecond delays truncate to zero and would never move the clock
                        .max(Duration::from_nanos(1));
                    debug!(key = %self.key, delay_ms = delay.as_millis() as u64, "throttle bucket empty, waiting");
                    self.clock.sleep(delay).await;
                }
            }
        }
    }

    /// Wait for a permit, then invoke `f` exactly once.
    pub async fn call<F, Fut>(&self, f: F) -> Result<Fut::Output, CoordinationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        self.wait().await?;
        Ok(f().await)
    }

    /// Turn `func` into a callable that waits for a permit on every call.
    pub fn wrap<A, T, F, Fut>(
        self,
        func: F,
    ) -> impl Fn(A) -> BoxFuture<'static, Result<T, CoordinationError>> + Clone + Send + Sync + 'static
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        A: Send + 'static,
        T: Send + 'static,
    {
        let func = Arc::new(func);
        move |arg: A| -> BoxFuture<'static, Result<T, CoordinationError>> {
            let throttle = self.clone();
            let func = Arc::clone(&func);
            Box::pin(async move {
                throttle.wait().await?;
                Ok((*func)(arg).await)
            })
        }
    }

    /// Permits currently in the bucket, refilled up to now.
    pub async fn available(&self) -> Result<f64, CoordinationError> {
        let raw = self.store.get(&self.key, self.config.retry).await?;
        let now = self.clock.now();
        let state = decode::<BucketState>(&self.key, raw)?.unwrap_or_else(|| BucketState::full(now, self.count));
        let refilled = state.tally + (now - state.last).max(0.0) * refill_rate(self.count, self.seconds);
        Ok(refilled.min(self.count as f64))
    }

    /// Get the throttle key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Rate limit `func` to `config.count` calls per `config.seconds`.
///
/// The bucket key is `config.name`, or the type name of `func` when unset.
/// Two closures defined in the same function share a type name, so give at
/// least one of them an explicit name.
pub async fn throttle<S, A, T, F, Fut>(
    store: Arc<S>,
    config: ThrottleConfig,
    func: F,
) -> Result<impl Fn(A) -> BoxFuture<'static, Result<T, CoordinationError>> + Clone + Send + Sync + 'static, CoordinationError>
where
    S: KeyValueStore + ?Sized + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
    A: Send + 'static,
    T: Send + 'static,
{
    let key = config.name.clone().unwrap_or_else(full_name::<F>);
    let throttle = Throttle::new(store, key, config).await?;
    Ok(throttle.wrap(func))
}
