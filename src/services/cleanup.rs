use std::time::SystemTime;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::SharedState;

/// Evict rooms idle for longer than the retention window, returning their ids.
///
/// Rooms with a live connection are kept regardless of their age. Evicted
/// rooms lose their session bindings and are deleted from the store. The
/// join gate is held while rooms are picked and removed, so a reconnect can
/// never land in a room that is about to disappear.
pub async fn sweep_idle(state: &SharedState, now: SystemTime) -> Vec<Uuid> {
    let retention = state.config().timings().room_retention;
    let mut evicted = Vec::new();

    {
        let _gate = state.join_gate().lock().await;
        for handle in state.room_handles().await {
            let idle = {
                let room = handle.lock().await;
                let quiet_for = now.duration_since(room.last_activity).unwrap_or_default();
                quiet_for >= retention && room.connections().next().is_none()
            };
            if idle {
                state.remove_room(handle.id()).await;
                info!(room_id = %handle.id(), "evicted idle room");
                evicted.push(handle.id());
            }
        }
    }

    if let Some(store) = state.room_store().await {
        for id in &evicted {
            if let Err(err) = store.delete_room(*id).await {
                warn!(room_id = %id, error = %err, "failed to delete evicted room");
            }
        }
    }

    evicted
}

/// Sweep idle rooms on the configured interval, forever.
pub async fn run_sweeper(state: SharedState) {
    let mut ticker = interval(state.config().timings().sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        sweep_idle(&state, SystemTime::now()).await;
    }
}
