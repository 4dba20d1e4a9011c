//! Coordination recipes built on a shared transactional key-value store.
//!
//! This crate provides coordination primitives for tasks, threads and
//! processes that share nothing but a store:
//!
//! - `Lock` - Non-reentrant mutual exclusion
//! - `RLock` - Reentrant mutual exclusion with owner tokens
//! - `BoundedSemaphore` - Counting semaphore that refuses releases past its bound
//! - `Throttle` - Token bucket rate limiting
//! - `barrier` / `guarded` - Serialize every call of a function
//! - `Averager` - Running mean over shared samples
//!
//! All primitives are built on the [`KeyValueStore`] trait's atomic `add`,
//! `pop` and transactions. Waiting is spin-wait polling; there are no wakeups,
//! no fairness and no FIFO ordering. [`InMemoryStore`] implements the store
//! contract for a single process and for tests.
//!
//! ## Lock Example
//!
//! ```ignore
//! use kv_recipes::{InMemoryStore, Lock, RecipeConfig};
//!
//! let store = InMemoryStore::new();
//! let lock = Lock::new(store, "report-123", RecipeConfig::default())?;
//!
//! let guard = lock.lock().await?;
//! // Protected critical section
//! guard.release().await?;
//! ```
//!
//! ## Throttle Example
//!
//! ```ignore
//! use kv_recipes::{throttle, ThrottleConfig};
//!
//! let send = throttle(store, ThrottleConfig::new(1, 1.0).with_name("mailer"), send_mail).await?;
//!
//! // One message per second, across every process sharing the store
//! for message in outbox {
//!     send(message).await?;
//! }
//! ```
//!
//! ## Barrier Example
//!
//! ```ignore
//! use kv_recipes::{barrier, Lock, RecipeConfig};
//!
//! let build = barrier(
//!     store,
//!     |store, key, config| Lock::new(store, key, config),
//!     None,
//!     RecipeConfig::default().with_expire(Duration::from_secs(60)),
//!     build_nightly_report,
//! )?;
//! build(date).await?;
//! ```

mod averager;
mod barrier;
mod clock;
mod config;
pub mod constants;
mod error;
mod guard;
mod lock;
pub mod pure;
mod rlock;
mod semaphore;
mod spin;
pub mod store;
mod throttle;
mod types;

pub use averager::Averager;
pub use barrier::barrier;
pub use barrier::guarded;
pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use config::Backoff;
pub use config::RecipeConfig;
pub use config::WriteOptions;
pub use error::CoordinationError;
pub use error::StoreError;
pub use guard::Guard;
pub use guard::Lockable;
pub use guard::with_lock;
pub use lock::Lock;
pub use rlock::RLock;
pub use semaphore::BoundedSemaphore;
pub use store::KeyValueStore;
pub use store::Transaction;
pub use store::inmemory::InMemoryStore;
pub use throttle::Throttle;
pub use throttle::ThrottleConfig;
pub use throttle::throttle;
pub use types::AverageState;
pub use types::BucketState;
pub use types::OwnerToken;
pub use types::RLockState;
pub use types::full_name;
pub use types::full_name_of;
