//! Pure decision functions for coordination recipes.
//!
//! This module implements the "Functional Core, Imperative Shell" pattern:
//! every decision a recipe makes inside its transaction (may I take this
//! lock, how many tokens does the bucket hold, how long must I sleep) lives
//! here as a deterministic function. The recipe modules only read state,
//! call into this module, and write the result back.
//!
//! All functions are:
//!
//! - **Deterministic**: No I/O, no system calls, time passed as explicit parameter
//! - **Total**: Saturating arithmetic, no panics on any input
//!
//! # Module Organization
//!
//! - [`averager`]: Running mean
//! - [`backoff`]: Poll sleep schedule (fixed, exponential, jittered)
//! - [`rlock`]: Reentrant ownership checks
//! - [`semaphore`]: Permit bounds
//! - [`throttle`]: Token bucket refill and consumption

pub mod averager;
pub mod backoff;
pub mod rlock;
pub mod semaphore;
pub mod throttle;

// ============================================================================
// Re-exports: Averager
// ============================================================================

pub use averager::compute_average;

// ============================================================================
// Re-exports: Backoff
// ============================================================================

pub use backoff::BackoffResult;
pub use backoff::compute_next_backoff;

// ============================================================================
// Re-exports: RLock
// ============================================================================

pub use rlock::can_acquire_reentrant;
pub use rlock::is_owned_by;

// ============================================================================
// Re-exports: Semaphore
// ============================================================================

pub use semaphore::can_return_permit;
pub use semaphore::can_take_permit;

// ============================================================================
// Re-exports: Throttle
// ============================================================================

pub use throttle::TALLY_EPSILON;
pub use throttle::ThrottleDecision;
pub use throttle::compute_throttle_decision;
pub use throttle::refill_rate;
