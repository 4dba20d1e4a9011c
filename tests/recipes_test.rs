/// Integration tests for coordination recipes over the in-memory store.
///
/// These run the recipes the way applications do: many handles on one store,
/// spread across spawned tasks, contending for the same keys.
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use kv_recipes::Averager;
use kv_recipes::BoundedSemaphore;
use kv_recipes::Clock;
use kv_recipes::CoordinationError;
use kv_recipes::InMemoryStore;
use kv_recipes::KeyValueStore;
use kv_recipes::Lock;
use kv_recipes::ManualClock;
use kv_recipes::RLock;
use kv_recipes::RecipeConfig;
use kv_recipes::StoreError;
use kv_recipes::Throttle;
use kv_recipes::ThrottleConfig;
use kv_recipes::Transaction;
use kv_recipes::WriteOptions;
use kv_recipes::barrier;
use kv_recipes::with_lock;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Tracks how many tasks are inside a critical section at once.
#[derive(Default)]
struct Occupancy {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Occupancy {
    async fn visit(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lock_mutual_exclusion() -> anyhow::Result<()> {
    init_tracing();
    let store = InMemoryStore::new();
    let occupancy = Arc::new(Occupancy::default());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let lock = Lock::new(store.clone(), "critical", RecipeConfig::default())?;
        let occupancy = Arc::clone(&occupancy);
        tasks.push(tokio::spawn(async move {
            for _ in 0..5 {
                with_lock(&lock, || occupancy.visit()).await?;
            }
            Ok::<_, CoordinationError>(())
        }));
    }
    for task in tasks {
        task.await??;
    }

    assert_eq!(occupancy.peak(), 1);
    assert!(!Lock::new(store, "critical", RecipeConfig::default())?.is_locked().await?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rlock_mutual_exclusion_with_reentry() -> anyhow::Result<()> {
    init_tracing();
    let store = InMemoryStore::new();
    let occupancy = Arc::new(Occupancy::default());

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let rlock = RLock::new(store.clone(), "critical", RecipeConfig::default())?;
        let occupancy = Arc::clone(&occupancy);
        tasks.push(tokio::spawn(async move {
            for _ in 0..3 {
                rlock.acquire().await?;
                rlock.acquire().await?;
                occupancy.visit().await;
                rlock.release().await?;
                rlock.release().await?;
            }
            Ok::<_, CoordinationError>(())
        }));
    }
    for task in tasks {
        task.await??;
    }

    assert_eq!(occupancy.peak(), 1);
    assert_eq!(RLock::new(store, "critical", RecipeConfig::default())?.depth().await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_semaphore_bounds_concurrency() -> anyhow::Result<()> {
    init_tracing();
    let store = InMemoryStore::new();
    let occupancy = Arc::new(Occupancy::default());
    let sem = BoundedSemaphore::new(store, "pool", 3, RecipeConfig::default())?;

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let sem = sem.clone();
        let occupancy = Arc::clone(&occupancy);
        tasks.push(tokio::spawn(async move {
            for _ in 0..3 {
                let permit = sem.lock().await?;
                occupancy.visit().await;
                permit.release().await?;
            }
            Ok::<_, CoordinationError>(())
        }));
    }
    for task in tasks {
        task.await??;
    }

    assert!(occupancy.peak() <= 3);
    assert_eq!(sem.available().await?, 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_semaphore_last_acquirer_waits() -> anyhow::Result<()> {
    let store = InMemoryStore::new();
    let sem = BoundedSemaphore::new(store, "pool", 2, RecipeConfig::default())?;

    let first = sem.lock().await?;
    let _second = sem.lock().await?;
    assert!(!sem.try_acquire().await?);

    let third = {
        let sem = sem.clone();
        tokio::spawn(async move { sem.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!third.is_finished());

    first.release().await?;
    third.await??;
    assert_eq!(sem.available().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_throttle_one_per_second() -> anyhow::Result<()> {
    let store = InMemoryStore::new();
    let clock = ManualClock::new(1_700_000_000.0);
    let throttle = Throttle::with_clock(store, "mailer", ThrottleConfig::new(1, 1.0), Arc::new(clock.clone())).await?;

    let mut times = Vec::new();
    for _ in 0..4 {
        let at = throttle.call(|| async { clock.now() }).await?;
        times.push(at);
    }

    let deltas: Vec<f64> = times.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(deltas, vec![1.0, 1.0, 1.0]);
    Ok(())
}

#[tokio::test]
async fn test_throttle_handles_share_bucket() -> anyhow::Result<()> {
    let store = InMemoryStore::new();
    let clock = ManualClock::new(0.0);
    let config = ThrottleConfig::new(2, 1.0);
    let a = Throttle::with_clock(store.clone(), "api", config.clone(), Arc::new(clock.clone())).await?;
    let b = a.clone();

    a.wait().await?;
    b.wait().await?;
    assert!(clock.sleeps().is_empty());

    // Bucket drained by the two handles together
    a.wait().await?;
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(500)]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_barrier_spaces_calls() -> anyhow::Result<()> {
    let store = InMemoryStore::new();
    let work = barrier(
        store,
        |store, key, config| Lock::new(store, key, config),
        Some("nightly"),
        RecipeConfig::default(),
        |_: ()| async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tokio::time::Instant::now()
        },
    )?;

    let tasks: Vec<_> = (0..4).map(|_| tokio::spawn(work(()))).collect();
    let mut finished = Vec::new();
    for task in tasks {
        finished.push(task.await??);
    }
    finished.sort();

    for pair in finished.windows(2) {
        let delta = pair[1] - pair[0];
        assert!(delta >= Duration::from_secs(1) && delta < Duration::from_millis(1100), "{:?}", delta);
    }
    Ok(())
}

#[tokio::test]
async fn test_averager_scenario() -> anyhow::Result<()> {
    let store = InMemoryStore::new();
    let nightly = Averager::new(store, "nightly-job", RecipeConfig::default())?;

    nightly.add(0.080).await?;
    nightly.add(0.120).await?;
    assert!((nightly.get().await? - 0.1).abs() < 1e-9);
    nightly.add(0.160).await?;
    assert!((nightly.get().await? - 0.12).abs() < 1e-9);
    assert!((nightly.pop().await? - 0.12).abs() < 1e-9);
    assert_eq!(nightly.get().await?, 0.0);
    Ok(())
}

#[tokio::test]
async fn test_tag_eviction_frees_lock() -> anyhow::Result<()> {
    let store = InMemoryStore::new();
    let config = RecipeConfig::default().with_tag("reports");
    let holder = Lock::new(store.clone(), "report-123", config.clone())?;
    let other = Lock::new(store.clone(), "report-123", config)?;

    assert!(holder.try_acquire().await?);
    assert!(!other.try_acquire().await?);
    assert_eq!(store.evict("reports").await, 1);
    assert!(other.try_acquire().await?);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_acquire_leaves_store_usable() -> anyhow::Result<()> {
    let store = InMemoryStore::new();
    let holder = RLock::new(store.clone(), "k", RecipeConfig::default())?;
    holder.acquire().await?;

    let waiter = RLock::new(store.clone(), "k", RecipeConfig::default())?;
    let timed_out = tokio::time::timeout(Duration::from_millis(20), waiter.acquire()).await;
    assert!(timed_out.is_err());

    holder.release().await?;
    assert!(waiter.try_acquire().await?);
    Ok(())
}

/// A store whose every operation fails.
struct UnavailableStore;

fn unavailable() -> StoreError {
    StoreError::Unavailable {
        reason: "connection refused".to_string(),
    }
}

#[async_trait]
impl KeyValueStore for UnavailableStore {
    async fn get(&self, _key: &str, _retry: bool) -> Result<Option<String>, StoreError> {
        Err(unavailable())
    }

    async fn set(&self, _key: &str, _value: String, _options: &WriteOptions, _retry: bool) -> Result<bool, StoreError> {
        Err(unavailable())
    }

    async fn add(&self, _key: &str, _value: String, _options: &WriteOptions, _retry: bool) -> Result<bool, StoreError> {
        Err(unavailable())
    }

    async fn delete(&self, _key: &str, _retry: bool) -> Result<bool, StoreError> {
        Err(unavailable())
    }

    async fn pop(&self, _key: &str, _retry: bool) -> Result<Option<String>, StoreError> {
        Err(unavailable())
    }

    async fn transact(&self, _retry: bool) -> Result<Box<dyn Transaction>, StoreError> {
        Err(unavailable())
    }
}

#[tokio::test]
async fn test_store_errors_propagate_unmodified() {
    let store = Arc::new(UnavailableStore);
    let expect_storage = |result: Result<(), CoordinationError>| match result {
        Err(CoordinationError::Storage { source }) => assert_eq!(source, unavailable()),
        other => panic!("expected storage error, got {:?}", other),
    };

    expect_storage(Lock::new(store.clone(), "k", RecipeConfig::default()).unwrap().acquire().await);
    expect_storage(RLock::new(store.clone(), "k", RecipeConfig::default()).unwrap().acquire().await);
    let sem = BoundedSemaphore::new(store.clone(), "k", 1, RecipeConfig::default()).unwrap();
    expect_storage(sem.acquire().await);
    expect_storage(Averager::new(store.clone(), "k", RecipeConfig::default()).unwrap().add(1.0).await);
    expect_storage(Throttle::new(store, "k", ThrottleConfig::new(1, 1.0)).await.map(|_| ()));
}

#[tokio::test(start_paused = true)]
async fn test_busy_store_without_retry_times_out() -> anyhow::Result<()> {
    let store = InMemoryStore::with_busy_timeout(Duration::from_millis(100));
    let averager = Averager::new(store.clone(), "k", RecipeConfig::default().with_retry(false))?;

    // Hold the store's only transaction open
    let txn = store.transact(true).await?;
    let result = averager.add(1.0).await;
    assert!(matches!(
        result,
        Err(CoordinationError::Storage {
            source: StoreError::Timeout { .. }
        })
    ));

    txn.rollback().await?;
    averager.add(1.0).await?;
    assert_eq!(averager.get().await?, 1.0);
    Ok(())
}
