//! Pure token bucket computation for the throttle.
//!
//! The bucket holds a fractional `tally` of permits, refilled continuously at
//! `count / seconds` per second and capped at `count`. Each call consumes one.
//!
//! # Tiger Style
//!
//! - Time is passed explicitly (seconds as `f64`)
//! - Elapsed time is clamped at zero, so a clock stepping backwards never
//!   drains the bucket
//! - The stored tally never exceeds `count` and never drops below zero
//! - A tally within [`TALLY_EPSILON`] of a whole permit counts as one, so a
//!   refill that lands a rounding error short still proceeds

/// Outcome of one throttle attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThrottleDecision {
    /// A permit was consumed. Store `(now, tally)` and invoke.
    Proceed {
        /// Tally to store after consuming one permit.
        tally: f64,
    },
    /// No whole permit is available yet.
    Wait {
        /// Seconds until one permit will have accrued.
        delay_secs: f64,
    },
}

impl ThrottleDecision {
    /// Check if the call may proceed.
    #[inline]
    pub fn is_proceed(&self) -> bool {
        matches!(self, ThrottleDecision::Proceed { .. })
    }
}

/// Shortfall below one permit still treated as a whole permit.
///
/// Timestamps near the Unix epoch scale carry roughly 2e-7 s of precision,
/// so a refill measured after sleeping the exact delay can come out short.
pub const TALLY_EPSILON: f64 = 1e-6;

/// Permits accrued per second.
#[inline]
pub fn refill_rate(count: u64, seconds: f64) -> f64 {
    count as f64 / seconds
}

/// Refill the bucket up to `now` and try to consume one permit.
///
/// # Arguments
///
/// * `last` - Time of the last stored refill (seconds)
/// * `tally` - Permits stored at `last`
/// * `now` - Current time (seconds)
/// * `count` - Bucket capacity
/// * `seconds` - Window over which `count` permits accrue
///
/// # Example
///
/// ```ignore
/// // Full bucket of 1, one call proceeds and empties it
/// let decision = compute_throttle_decision(0.0, 1.0, 0.0, 1, 1.0);
/// assert_eq!(decision, ThrottleDecision::Proceed { tally: 0.0 });
///
/// // Empty bucket, half a second until the next permit
/// let decision = compute_throttle_decision(0.0, 0.0, 0.5, 1, 1.0);
/// assert_eq!(decision, ThrottleDecision::Wait { delay_secs: 0.5 });
/// ```
#[inline]
pub fn compute_throttle_decision(last: f64, tally: f64, now: f64, count: u64, seconds: f64) -> ThrottleDecision {
    let rate = refill_rate(count, seconds);
    let elapsed = (now - last).max(0.0);
    let tally = tally + elapsed * rate;
    let capacity = count as f64;

    if tally > capacity {
        ThrottleDecision::Proceed { tally: capacity - 1.0 }
    } else if tally >= 1.0 - TALLY_EPSILON {
        ThrottleDecision::Proceed {
            tally: (tally - 1.0).max(0.0),
        }
    } else {
        ThrottleDecision::Wait {
            delay_secs: (1.0 - tally) / rate,
        }
    }
}
