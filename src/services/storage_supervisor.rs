use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{room_store::RoomStore, storage::StorageError},
    services::persistence,
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Install a freshly connected store, restoring persisted rooms the first time.
pub async fn install(state: &SharedState, store: Arc<dyn RoomStore>) {
    if let Err(err) = persistence::restore(state, &store).await {
        warn!(error = %err, "failed to restore rooms; starting with the rooms in memory");
    }
    state.install_room_store(store).await;
    info!("storage connection established; leaving degraded mode");
}

/// Keep the room store connected, toggling degraded mode while it is unavailable.
///
/// An already installed store is supervised first; `connect` is only used
/// once it has been given up on.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn RoomStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        let store = match state.room_store().await {
            Some(store) => store,
            None => match connect().await {
                Ok(store) => {
                    install(&state, Arc::clone(&store)).await;
                    delay = INITIAL_DELAY;
                    store
                }
                Err(err) => {
                    warn!(error = %err, "storage connection attempt failed");
                    sleep(delay).await;
                    delay = (delay * 2).min(MAX_DELAY);
                    continue;
                }
            },
        };

        if supervise(&state, store.as_ref()).await {
            continue;
        }

        warn!("exhausted storage reconnect attempts; staying in degraded mode");
        state.clear_room_store().await;
        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Poll the store until it fails and cannot be revived; returns `false` then.
async fn supervise(state: &SharedState, store: &dyn RoomStore) -> bool {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("storage healthy again; leaving degraded mode");
                    state.update_degraded(false);
                }
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                if !reconnect(state, store).await {
                    return false;
                }
                state.update_degraded(false);
                sleep(HEALTH_POLL_INTERVAL).await;
            }
        }
    }
}

async fn reconnect(state: &SharedState, store: &dyn RoomStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %err,
                        "storage reconnect first attempt failed; entering degraded mode"
                    );
                    state.update_degraded(true);
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::BoxFuture;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::RoomEntity, storage::StorageResult},
        state::AppState,
    };

    /// Store whose health check fails a configurable number of times.
    #[derive(Default)]
    struct FlakyStore {
        failing_checks: AtomicUsize,
        failing_reconnects: AtomicUsize,
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    fn offline() -> StorageError {
        StorageError::unavailable(
            "offline".into(),
            std::io::Error::new(std::io::ErrorKind::NotConnected, "offline"),
        )
    }

    impl RoomStore for FlakyStore {
        fn save_room(&self, _room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn load_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn delete_room(&self, _id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
            Box::pin(async { Ok(false) })
        }

        fn clear(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            let failed = take_failure(&self.failing_checks);
            Box::pin(async move { if failed { Err(offline()) } else { Ok(()) } })
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            let failed = take_failure(&self.failing_reconnects);
            Box::pin(async move { if failed { Err(offline()) } else { Ok(()) } })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connects_and_leaves_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded());

        let supervisor = tokio::spawn(run(Arc::clone(&state), || async {
            Ok(Arc::new(FlakyStore::default()) as Arc<dyn RoomStore>)
        }));
        sleep(Duration::from_millis(10)).await;

        assert!(!state.is_degraded());
        assert!(state.room_store().await.is_some());
        supervisor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reconnects_drop_the_store() {
        let state = AppState::new(AppConfig::default());
        let store = Arc::new(FlakyStore {
            failing_checks: AtomicUsize::new(usize::MAX),
            failing_reconnects: AtomicUsize::new(usize::MAX),
        });
        state.install_room_store(store).await;

        let supervisor = tokio::spawn(run(Arc::clone(&state), || async {
            Err::<Arc<dyn RoomStore>, _>(offline())
        }));
        sleep(Duration::from_secs(8)).await;

        assert!(state.is_degraded());
        assert!(state.room_store().await.is_none());
        supervisor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_recovers_in_place() {
        let state = AppState::new(AppConfig::default());
        let store = Arc::new(FlakyStore {
            failing_checks: AtomicUsize::new(1),
            failing_reconnects: AtomicUsize::new(1),
        });
        state.install_room_store(store).await;

        let supervisor = tokio::spawn(run(Arc::clone(&state), || async {
            Err::<Arc<dyn RoomStore>, _>(offline())
        }));
        sleep(Duration::from_millis(1_500)).await;

        assert!(!state.is_degraded());
        assert!(state.room_store().await.is_some());
        supervisor.abort();
    }
}
