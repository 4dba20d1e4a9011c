//! Pure backoff computation for spin-wait polling.
//!
//! # Tiger Style
//!
//! - Uses saturating arithmetic for all calculations
//! - Randomness is passed in as a seed (no RNG calls here)
//! - Every sleep is bounded by the strategy's cap

use crate::config::Backoff;

/// Result of one backoff step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffResult {
    /// How long to sleep before the next attempt (milliseconds).
    pub sleep_ms: u64,
    /// Base sleep to use for the attempt after that (milliseconds).
    pub next_backoff_ms: u64,
}

/// Compute the sleep for the current attempt and the base for the next one.
///
/// # Arguments
///
/// * `strategy` - Configured backoff strategy
/// * `current_backoff_ms` - Base sleep for this attempt
/// * `jitter_seed` - Random value, only used by [`Backoff::Jittered`]
///
/// # Example
///
/// ```ignore
/// let result = compute_next_backoff(Backoff::Jittered { max_ms: 1000 }, 100, 25);
/// assert_eq!(result.sleep_ms, 125); // 100 + 25 jitter
/// assert_eq!(result.next_backoff_ms, 200); // doubled
/// ```
///
/// # Tiger Style
///
/// - Jitter is bounded to half the current backoff + 1
/// - The doubled base never exceeds `max_ms`
#[inline]
pub fn compute_next_backoff(strategy: Backoff, current_backoff_ms: u64, jitter_seed: u64) -> BackoffResult {
    match strategy {
        Backoff::Fixed => BackoffResult {
            sleep_ms: current_backoff_ms,
            next_backoff_ms: current_backoff_ms,
        },
        Backoff::Exponential { max_ms } => BackoffResult {
            sleep_ms: current_backoff_ms.min(max_ms),
            next_backoff_ms: current_backoff_ms.saturating_mul(2).min(max_ms),
        },
        Backoff::Jittered { max_ms } => {
            let base = current_backoff_ms.min(max_ms);
            let max_jitter = base.saturating_div(2).saturating_add(1);
            BackoffResult {
                sleep_ms: base.saturating_add(jitter_seed % max_jitter),
                next_backoff_ms: base.saturating_mul(2).min(max_ms),
            }
        }
    }
}
