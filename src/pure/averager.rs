//! Pure running-average computation.

/// Compute the mean of `count` samples summing to `total`.
///
/// Returns `0.0` when no samples have been recorded.
///
/// # Example
///
/// ```ignore
/// assert_eq!(compute_average(0.0, 0), 0.0);
/// assert_eq!(compute_average(3.0, 2), 1.5);
/// ```
#[inline]
pub fn compute_average(total: f64, count: u64) -> f64 {
    if count == 0 { 0.0 } else { total / count as f64 }
}
