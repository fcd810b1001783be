//! Background removal of expired revocation records.
//!
//! Once a refresh token's `exp` has passed it can never authenticate again, so
//! neither its active record nor its blacklist record carries information.
//!
//! The task holds a `Weak` reference to the store and exits on the first tick
//! after the store is dropped.

use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::clock::TimeSource;

use super::RevocationStore;

/// Spawn a task that purges expired records every `interval`.
///
/// # Pre-conditions
/// - `interval` is non-zero.
///
/// # Returns
/// A `JoinHandle` that can be awaited or aborted on shutdown.
pub fn spawn_sweep_task<S>(
    store: Weak<S>,
    clock: Arc<dyn TimeSource>,
    interval: Duration,
) -> tokio::task::JoinHandle<()>
where
    S: RevocationStore + 'static,
{
    tokio::spawn(async move {
        sweep_loop(store, clock, interval).await;
    })
}

async fn sweep_loop<S: RevocationStore>(
    store: Weak<S>,
    clock: Arc<dyn TimeSource>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let Some(store) = store.upgrade() else {
            tracing::debug!("revocation store dropped, stopping sweep");
            break;
        };

        match store.purge_expired(clock.now_secs()) {
            Ok(result) => {
                if result.active_removed > 0 || result.blacklisted_removed > 0 {
                    tracing::info!(
                        active = result.active_removed,
                        blacklisted = result.blacklisted_removed,
                        "purged expired refresh token records"
                    );
                }
            }
            Err(e) => {
                tracing::error!("sweep failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;
    use crate::directory::UserId;
    use crate::store::{ActiveRecord, MemoryRevocationStore};

    #[tokio::test(start_paused = true)]
    async fn test_sweep_purges_expired_records() {
        let clock = Arc::new(ManualTimeSource::new(1_000));
        let store = Arc::new(MemoryRevocationStore::new());
        store
            .insert_active(ActiveRecord {
                token_string: "abc".to_string(),
                owner: UserId::from(1),
                expires_at: 1_500,
            })
            .expect("insert");

        let handle = spawn_sweep_task(
            Arc::downgrade(&store),
            Arc::clone(&clock) as Arc<dyn TimeSource>,
            Duration::from_secs(60),
        );

        clock.set(2_000);
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert!(!store.is_active("abc").expect("read"));
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_exits_when_store_dropped() {
        let store = Arc::new(MemoryRevocationStore::new());
        let handle = spawn_sweep_task(
            Arc::downgrade(&store),
            Arc::new(ManualTimeSource::default()),
            Duration::from_secs(60),
        );

        drop(store);

        let result = tokio::time::timeout(Duration::from_secs(120), handle).await;
        assert!(result.is_ok(), "sweep task should exit when store is dropped");
    }
}
