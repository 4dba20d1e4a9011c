//! Spin-wait polling between acquisition attempts.
//!
//! The store offers no wait/notify, so waiters sleep and poll. There is no
//! queue: whichever waiter's write the store serializes first wins.

use std::time::Duration;

use rand::Rng;
use tracing::trace;

use crate::config::Backoff;
use crate::config::RecipeConfig;
use crate::pure::compute_next_backoff;

/// Sleep schedule for one acquisition attempt loop.
#[derive(Debug)]
pub(crate) struct SpinWait {
    strategy: Backoff,
    backoff_ms: u64,
    attempts: u64,
}

impl SpinWait {
    pub(crate) fn new(config: &RecipeConfig) -> Self {
        Self {
            strategy: config.backoff,
            backoff_ms: config.poll_interval_ms,
            attempts: 0,
        }
    }

    /// Sleep before the next attempt.
    pub(crate) async fn wait(&mut self, key: &str) {
        // Create rng here to avoid holding non-Send type across await
        let jitter_seed = match self.strategy {
            Backoff::Jittered { .. } => rand::rng().random::<u64>(),
            _ => 0,
        };
        let result = compute_next_backoff(self.strategy, self.backoff_ms, jitter_seed);
        self.backoff_ms = result.next_backoff_ms;
        self.attempts += 1;

        trace!(key, attempt = self.attempts, sleep_ms = result.sleep_ms, "resource busy, backing off");
        tokio::time::sleep(Duration::from_millis(result.sleep_ms)).await;
    }
}
