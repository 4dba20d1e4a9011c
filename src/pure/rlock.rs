//! Pure reentrant lock ownership checks.
//!
//! State is `(owner, depth)`. `depth == 0` means unheld regardless of the
//! owner left behind by the last release.

/// Check whether `token` may take the lock (again).
///
/// # Arguments
///
/// * `owner` - Token recorded by the most recent acquisition, if any
/// * `depth` - Current reentrancy depth
/// * `token` - Token of the caller
///
/// # Returns
///
/// `true` if the lock is free or already held by `token`.
#[inline]
pub fn can_acquire_reentrant(owner: Option<&str>, depth: u32, token: &str) -> bool {
    depth == 0 || owner == Some(token)
}

/// Check whether `token` currently holds the lock.
///
/// A release is only valid when this holds.
#[inline]
pub fn is_owned_by(owner: Option<&str>, depth: u32, token: &str) -> bool {
    depth > 0 && owner == Some(token)
}
