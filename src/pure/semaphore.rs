//! Pure bounded semaphore permit checks.
//!
//! # Tiger Style
//!
//! - The bound is checked on both sides so `available` stays in `[0, max_value]`

/// Check if a permit can be taken.
#[inline]
pub fn can_take_permit(available: u32) -> bool {
    available > 0
}

/// Check if a permit can be given back without exceeding the bound.
///
/// # Arguments
///
/// * `available` - Permits currently available
/// * `max_value` - The semaphore's bound
#[inline]
pub fn can_return_permit(available: u32, max_value: u32) -> bool {
    available < max_value
}
