//! Shared types for coordination recipes.

use serde::Deserialize;
use serde::Serialize;

/// Identity of a reentrant lock holder.
///
/// Token equality defines ownership. Each [`RLock`](crate::RLock) handle
/// carries one; clones of a handle share it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerToken(String);

impl OwnerToken {
    /// Use a caller-chosen identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate a random token (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the raw token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reentrant lock state stored in the KV store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RLockState {
    /// Token of the most recent acquirer. Kept after the final release.
    pub owner: Option<String>,
    /// Reentrancy depth. Zero means unheld.
    pub depth: u32,
}

/// Running average state stored in the KV store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AverageState {
    /// Sum of all samples.
    pub total: f64,
    /// Number of samples.
    pub count: u64,
}

/// Throttle bucket state stored in the KV store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketState {
    /// Time of the last refill (seconds since the Unix epoch, per the throttle's clock).
    pub last: f64,
    /// Fractional permits available at `last`.
    pub tally: f64,
}

impl BucketState {
    /// A full bucket as of `now`.
    pub fn full(now: f64, count: u64) -> Self {
        Self {
            last: now,
            tally: count as f64,
        }
    }
}

/// Fully-qualified name of a callable's type.
///
/// Used as the default key of throttles and barriers: function items resolve
/// to their path (`my_crate::reports::build`), closures to their defining
/// function plus `{{closure}}`, so wrappers declared in different places get
/// distinct keys without naming them. Two closures defined in the same
/// function share a name and need an explicit key.
pub fn full_name<F>() -> String {
    std::any::type_name::<F>().to_string()
}

/// [`full_name`] for a value whose type cannot be named.
pub fn full_name_of<F>(_: &F) -> String {
    full_name::<F>()
}
