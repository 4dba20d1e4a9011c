//! Defaults and fixed limits for coordination recipes.
//!
//! Tiger Style: Constants are fixed and immutable, enforced at compile time.
//! Each constant has explicit bounds so a misconfigured poll loop cannot spin
//! without sleeping or sleep unboundedly.

// ============================================================================
// Polling
// ============================================================================

/// Default sleep between acquisition attempts (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1;

/// Lower bound accepted for the poll interval (milliseconds).
pub const MIN_POLL_INTERVAL_MS: u64 = 1;

/// Upper bound accepted for any single backoff sleep (milliseconds).
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;

/// Default cap for exponential and jittered backoff (milliseconds).
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 100;

// ============================================================================
// Store
// ============================================================================

/// How long a store operation waits for a busy store before reporting a timeout.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 60_000;

/// Writes between sweeps of expired entries in `InMemoryStore`.
pub const PURGE_INTERVAL_WRITES: u64 = 1024;

/// Value written at a `Lock` key. Only presence is meaningful.
pub const LOCK_SENTINEL: &str = "null";

// ============================================================================
// Semaphore
// ============================================================================

/// Default bound of a `BoundedSemaphore`.
pub const DEFAULT_SEMAPHORE_VALUE: u32 = 1;

// ============================================================================
// Environment
// ============================================================================

/// Prefix of environment variables read by `RecipeConfig::load`.
pub const ENV_PREFIX: &str = "KV_RECIPES_";

// ============================================================================
// Compile-time checks
// ============================================================================

const _: () = assert!(MIN_POLL_INTERVAL_MS > 0);
const _: () = assert!(DEFAULT_POLL_INTERVAL_MS >= MIN_POLL_INTERVAL_MS);
const _: () = assert!(DEFAULT_POLL_INTERVAL_MS <= DEFAULT_MAX_BACKOFF_MS);
const _: () = assert!(DEFAULT_MAX_BACKOFF_MS <= MAX_POLL_INTERVAL_MS);
const _: () = assert!(DEFAULT_SEMAPHORE_VALUE > 0);
const _: () = assert!(DEFAULT_BUSY_TIMEOUT_MS > 0);
const _: () = assert!(PURGE_INTERVAL_WRITES > 0);
