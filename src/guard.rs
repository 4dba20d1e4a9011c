//! Scoped acquisition shared by every lock-shaped recipe.
//!
//! A [`Guard`] holds an acquisition for exactly its own lifetime. Prefer
//! [`Guard::release`], which reports release errors. A guard dropped while
//! still held (early return, `?`, panic unwind, cancelled future) releases
//! in a task spawned on the current tokio runtime.

use std::future::Future;

use async_trait::async_trait;
use tracing::debug;
use tracing::warn;

use crate::error::CoordinationError;

/// A resource with paired acquire/release, such as a lock or semaphore.
#[async_trait]
pub trait Lockable: Send + Sync {
    /// Block until the resource is acquired.
    async fn acquire(&self) -> Result<(), CoordinationError>;

    /// Give the resource back.
    async fn release(&self) -> Result<(), CoordinationError>;

    /// Store key holding the resource's state.
    fn key(&self) -> &str;
}

/// RAII guard that releases its resource on drop.
#[must_use = "the resource is released as soon as the guard is dropped"]
pub struct Guard<L: Lockable + Clone + 'static> {
    held: Option<L>,
}

impl<L: Lockable + Clone + 'static> Guard<L> {
    /// Acquire `lock` and hold it until the guard is released or dropped.
    pub async fn acquire(lock: &L) -> Result<Self, CoordinationError> {
        lock.acquire().await?;
        Ok(Self {
            held: Some(lock.clone()),
        })
    }

    /// Key of the held resource.
    pub fn key(&self) -> &str {
        self.held.as_ref().map(|lock| lock.key()).unwrap_or_default()
    }

    /// Explicitly release the resource.
    pub async fn release(mut self) -> Result<(), CoordinationError> {
        match self.held.take() {
            Some(lock) => lock.release().await,
            None => Ok(()),
        }
    }
}

impl<L: Lockable + Clone + 'static> Drop for Guard<L> {
    fn drop(&mut self) {
        let Some(lock) = self.held.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match lock.release().await {
                        Ok(()) => debug!(key = %lock.key(), "released on drop"),
                        Err(e) => warn!(key = %lock.key(), error = %e, "release on drop failed"),
                    }
                });
            }
            Err(_) => {
                warn!(
                    key = %lock.key(),
                    "guard dropped outside a tokio runtime, resource stays held until its entry expires"
                );
            }
        }
    }
}

/// Run `f` while holding `lock`.
///
/// The resource is released after `f` completes. If `f` panics or the
/// returned future is dropped, the guard's drop releases it instead.
pub async fn with_lock<L, F, Fut>(lock: &L, f: F) -> Result<Fut::Output, CoordinationError>
where
    L: Lockable + Clone + 'static,
    F: FnOnce() -> Fut,
    Fut: Future,
{
    let guard = Guard::acquire(lock).await?;
    let output = f().await;
    guard.release().await?;
    Ok(output)
}
