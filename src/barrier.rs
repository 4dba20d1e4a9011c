//! Serialize every call of a function across tasks, threads and processes.
//!
//! A barrier wraps a callable so that each invocation runs while holding a
//! [`Lockable`]. With a [`Lock`](crate::Lock) or [`RLock`](crate::RLock) one
//! call runs at a time everywhere; with a
//! [`BoundedSemaphore`](crate::BoundedSemaphore) up to its value run at once.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::config::RecipeConfig;
use crate::error::CoordinationError;
use crate::guard::Lockable;
use crate::guard::with_lock;
use crate::store::KeyValueStore;
use crate::types::full_name;

/// Wrap `func` so that every invocation holds `lock` for its whole duration.
pub fn guarded<L, A, T, F, Fut>(
    lock: L,
    func: F,
) -> impl Fn(A) -> BoxFuture<'static, Result<T, CoordinationError>> + Clone + Send + Sync + 'static
where
    L: Lockable + Clone + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
    A: Send + 'static,
    T: Send + 'static,
{
    let func = Arc::new(func);
    move |arg: A| -> BoxFuture<'static, Result<T, CoordinationError>> {
        let lock = lock.clone();
        let func = Arc::clone(&func);
        Box::pin(async move { with_lock(&lock, move || (*func)(arg)).await })
    }
}

/// Build a lock on `name` (or the type name of `func`) and wrap `func` in it.
///
/// `make_lock` receives the store, the derived key and `config`, so any
/// lock-shaped recipe can back the barrier:
///
/// ```ignore
/// let build = barrier(store, |store, key, config| Lock::new(store, key, config), None, config, build_report)?;
/// ```
///
/// # Errors
///
/// Returns whatever `make_lock` fails with, typically `InvalidConfig`.
pub fn barrier<S, L, M, A, T, F, Fut>(
    store: Arc<S>,
    make_lock: M,
    name: Option<&str>,
    config: RecipeConfig,
    func: F,
) -> Result<impl Fn(A) -> BoxFuture<'static, Result<T, CoordinationError>> + Clone + Send + Sync + 'static, CoordinationError>
where
    S: KeyValueStore + ?Sized,
    L: Lockable + Clone + 'static,
    M: FnOnce(Arc<S>, String, RecipeConfig) -> Result<L, CoordinationError>,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
    A: Send + 'static,
    T: Send + 'static,
{
    let key = name.map(str::to_string).unwrap_or_else(full_name::<F>);
    let lock = make_lock(store, key, config)?;
    Ok(guarded(lock, func))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::lock::Lock;
    use crate::semaphore::BoundedSemaphore;
    use crate::store::inmemory::InMemoryStore;

    #[derive(Default)]
    struct Occupancy {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Occupancy {
        async fn visit(&self, hold: Duration) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(hold).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_barrier_serializes_calls() {
        let store = InMemoryStore::new();
        let work = barrier(
            store,
            |store, key, config| Lock::new(store, key, config),
            Some("report"),
            RecipeConfig::default(),
            |_: ()| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                tokio::time::Instant::now()
            },
        )
        .unwrap();

        let start = tokio::time::Instant::now();
        let tasks: Vec<_> = (0..4).map(|_| tokio::spawn(work(()))).collect();
        let mut finished = Vec::new();
        for task in tasks {
            finished.push(task.await.unwrap().unwrap());
        }
        finished.sort();

        let mut previous = start;
        for at in finished {
            let delta = at - previous;
            assert!(delta >= Duration::from_secs(1) && delta < Duration::from_millis(1100), "{:?}", delta);
            previous = at;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_semaphore_bounds_concurrency() {
        let store = InMemoryStore::new();
        let sem = BoundedSemaphore::new(store, "pool", 2, RecipeConfig::default()).unwrap();
        let occupancy = Arc::new(Occupancy::default());

        let work = {
            let occupancy = Arc::clone(&occupancy);
            guarded(sem.clone(), move |_: ()| {
                let occupancy = Arc::clone(&occupancy);
                async move { occupancy.visit(Duration::from_millis(100)).await }
            })
        };

        let tasks: Vec<_> = (0..6).map(|_| tokio::spawn(work(()))).collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(occupancy.peak.load(Ordering::SeqCst), 2);
        assert_eq!(sem.available().await.unwrap(), 2);
    }

    async fn build_report(id: u32) -> u32 {
        id
    }

    #[tokio::test]
    async fn test_default_key_is_function_name() {
        let store = InMemoryStore::new();
        let keys = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let work = {
            let keys = Arc::clone(&keys);
            barrier(
                store,
                move |store, key: String, config| {
                    keys.lock().push(key.clone());
                    Lock::new(store, key, config)
                },
                None,
                RecipeConfig::default(),
                build_report,
            )
            .unwrap()
        };

        assert_eq!(work(7).await.unwrap(), 7);
        let keys = keys.lock().clone();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].ends_with("barrier::tests::build_report"), "{}", keys[0]);
    }

    #[tokio::test]
    async fn test_invalid_config_surfaces_from_make_lock() {
        let store = InMemoryStore::new();
        let config = RecipeConfig {
            poll_interval_ms: 0,
            ..RecipeConfig::default()
        };
        let result = barrier(
            store,
            |store, key, config| Lock::new(store, key, config),
            Some("report"),
            config,
            build_report,
        );
        assert!(matches!(result, Err(CoordinationError::InvalidConfig { .. })));
    }
}
