//! Construction-time configuration for recipes.
//!
//! Every recipe takes a [`RecipeConfig`]. It is serde-deserializable with
//! defaults for every field, so it can be embedded in an application's own
//! configuration file, or loaded from environment variables with
//! [`RecipeConfig::load`].

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_MAX_BACKOFF_MS;
use crate::constants::DEFAULT_POLL_INTERVAL_MS;
use crate::constants::ENV_PREFIX;
use crate::constants::MAX_POLL_INTERVAL_MS;
use crate::constants::MIN_POLL_INTERVAL_MS;
use crate::error::CoordinationError;

/// Default values for configuration
mod defaults {
    pub fn retry() -> bool {
        true
    }

    pub fn poll_interval_ms() -> u64 {
        super::DEFAULT_POLL_INTERVAL_MS
    }
}

/// Convert to milliseconds, rounding any fraction up.
fn ceil_millis(duration: Duration) -> u64 {
    let millis = duration.as_millis() + u128::from(duration.subsec_nanos() % 1_000_000 != 0);
    u64::try_from(millis).unwrap_or(u64::MAX)
}

/// Sleep schedule between acquisition attempts.
///
/// No strategy provides fairness: every waiter polls independently and the
/// first write the store serializes wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Backoff {
    /// Sleep `poll_interval_ms` every time.
    #[default]
    Fixed,
    /// Double the sleep after each failed attempt, up to `max_ms`.
    Exponential {
        /// Cap on a single sleep.
        max_ms: u64,
    },
    /// Exponential, plus a random extra of up to half the current sleep.
    Jittered {
        /// Cap on the exponential component.
        max_ms: u64,
    },
}

impl Backoff {
    /// Exponential backoff capped at the crate default.
    pub fn exponential() -> Self {
        Backoff::Exponential {
            max_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }

    /// Jittered backoff capped at the crate default.
    pub fn jittered() -> Self {
        Backoff::Jittered {
            max_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }

    fn max_ms(&self) -> Option<u64> {
        match self {
            Backoff::Fixed => None,
            Backoff::Exponential { max_ms } | Backoff::Jittered { max_ms } => Some(*max_ms),
        }
    }
}

/// Options passed to the store with every write of a key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Time-to-live applied to the entry. `None` means it never expires.
    pub expire_ms: Option<u64>,
    /// Opaque grouping label used for bulk eviction.
    pub tag: Option<String>,
}

impl WriteOptions {
    /// Get the time-to-live as a duration.
    pub fn expire(&self) -> Option<Duration> {
        self.expire_ms.map(Duration::from_millis)
    }
}

/// Configuration shared by every recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeConfig {
    /// Time-to-live applied to every write of the recipe's key.
    ///
    /// Bounds how long state from a crashed holder survives. Never renewed
    /// by the recipes themselves.
    #[serde(default)]
    pub expire_ms: Option<u64>,
    /// Grouping label passed through to the store.
    #[serde(default)]
    pub tag: Option<String>,
    /// Let the store wait out busy periods instead of failing with a timeout.
    #[serde(default = "defaults::retry")]
    pub retry: bool,
    /// Base sleep between acquisition attempts (milliseconds).
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How the sleep grows across failed attempts.
    #[serde(default)]
    pub backoff: Backoff,
}

impl Default for RecipeConfig {
    fn default() -> Self {
        Self {
            expire_ms: None,
            tag: None,
            retry: defaults::retry(),
            poll_interval_ms: defaults::poll_interval_ms(),
            backoff: Backoff::default(),
        }
    }
}

impl RecipeConfig {
    /// Load configuration from `KV_RECIPES_*` environment variables.
    ///
    /// Recognized: `EXPIRE_MS`, `TAG`, `RETRY`, `POLL_INTERVAL_MS`,
    /// `BACKOFF` (`fixed`, `exponential` or `jittered`) and `MAX_BACKOFF_MS`.
    /// Unset or unparseable variables fall back to defaults.
    pub fn load() -> Result<Self, CoordinationError> {
        let var = |name: &str| std::env::var(format!("{ENV_PREFIX}{name}")).ok();

        let max_ms = var("MAX_BACKOFF_MS").and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_MAX_BACKOFF_MS);
        let backoff = match var("BACKOFF").as_deref() {
            Some("exponential") => Backoff::Exponential { max_ms },
            Some("jittered") => Backoff::Jittered { max_ms },
            _ => Backoff::Fixed,
        };

        let config = Self {
            expire_ms: var("EXPIRE_MS").and_then(|v| v.parse().ok()),
            tag: var("TAG"),
            retry: var("RETRY").and_then(|v| v.parse().ok()).unwrap_or_else(defaults::retry),
            poll_interval_ms: var("POLL_INTERVAL_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(defaults::poll_interval_ms),
            backoff,
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the time-to-live applied to every write.
    ///
    /// Rounded up to whole milliseconds, so any nonzero TTL stays nonzero.
    pub fn with_expire(mut self, expire: Duration) -> Self {
        self.expire_ms = Some(ceil_millis(expire));
        self
    }

    /// Set the grouping tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Set the store retry flag.
    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    /// Set the base poll interval, rounded up to whole milliseconds.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = ceil_millis(interval);
        self
    }

    /// Set the backoff strategy.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Check that the TTL is nonzero and the poll schedule is bounded.
    pub fn validate(&self) -> Result<(), CoordinationError> {
        if self.expire_ms == Some(0) {
            return Err(CoordinationError::InvalidConfig {
                reason: "expire_ms must be at least 1, a zero TTL expires every write on arrival".to_string(),
            });
        }
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&self.poll_interval_ms) {
            return Err(CoordinationError::InvalidConfig {
                reason: format!(
                    "poll_interval_ms {} outside [{}, {}]",
                    self.poll_interval_ms, MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS
                ),
            });
        }
        if let Some(max_ms) = self.backoff.max_ms()
            && !(self.poll_interval_ms..=MAX_POLL_INTERVAL_MS).contains(&max_ms)
        {
            return Err(CoordinationError::InvalidConfig {
                reason: format!(
                    "backoff max_ms {} outside [{}, {}]",
                    max_ms, self.poll_interval_ms, MAX_POLL_INTERVAL_MS
                ),
            });
        }
        Ok(())
    }

    /// Options handed to the store on every write.
    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            expire_ms: self.expire_ms,
            tag: self.tag.clone(),
        }
    }

    /// Get the base poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
