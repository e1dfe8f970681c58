//! Background persistence of dirty rooms and startup restoration.

use std::sync::Arc;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{
    dao::{models::RoomEntity, room_store::RoomStore, storage::StorageError},
    services::room_service,
    state::SharedState,
};

/// Write every dirty room to the installed store, returning how many were saved.
///
/// Rooms stay dirty while no store is installed; a failed write raises the
/// flag again so the next pass retries it.
pub async fn flush_dirty(state: &SharedState) -> usize {
    let Some(store) = state.room_store().await else {
        return 0;
    };

    let mut saved = 0;
    for handle in state.room_handles().await {
        if !handle.take_dirty() {
            continue;
        }
        let entity = RoomEntity::from(&*handle.lock().await);
        match store.save_room(entity).await {
            Ok(()) => saved += 1,
            Err(err) => {
                warn!(room_id = %handle.id(), error = %err, "failed to persist room");
                handle.mark_dirty();
            }
        }
    }

    if saved > 0 {
        debug!(saved, "flushed dirty rooms");
    }
    saved
}

/// Mark every room dirty and flush once; used on shutdown.
pub async fn flush_all(state: &SharedState) -> usize {
    for handle in state.room_handles().await {
        handle.mark_dirty();
    }
    flush_dirty(state).await
}

/// Flush dirty rooms on the configured interval, forever.
pub async fn run_flusher(state: SharedState) {
    let mut ticker = interval(state.config().timings().flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        flush_dirty(&state).await;
    }
}

/// Load persisted rooms into the registry, returning how many were restored.
///
/// Runs at most once per process. A corrupt snapshot wipes the store and the
/// server starts without rooms. Rooms or session tokens that already exist
/// in memory win over their stored counterparts.
pub async fn restore(
    state: &SharedState,
    store: &Arc<dyn RoomStore>,
) -> Result<usize, StorageError> {
    if !state.mark_restored() {
        return Ok(0);
    }

    let entities = match store.load_rooms().await {
        Ok(entities) => entities,
        Err(err) if err.is_corrupt() => {
            discard_corrupt(store, &err).await?;
            return Ok(0);
        }
        Err(err) => return Err(err),
    };

    let board = state.config().board();
    let mut rooms = Vec::with_capacity(entities.len());
    for entity in entities {
        match entity.into_room(&board) {
            Ok(room) => rooms.push(room),
            Err(err) => {
                discard_corrupt(store, &err).await?;
                return Ok(0);
            }
        }
    }
    rooms.sort_by_key(|room| room.created_at);

    let mut restored = 0;
    for room in rooms {
        if state.room(room.id).await.is_some() {
            continue;
        }
        let pending = room.pending;
        let bindings: Vec<_> = room
            .players
            .iter()
            .filter_map(|player| {
                player
                    .session_token
                    .clone()
                    .map(|token| (token, player.slot))
            })
            .collect();

        let handle = state.insert_room(room).await;
        handle.take_dirty();
        for (token, slot) in bindings {
            if state.sessions().resolve(&token).is_none() {
                state.sessions().bind(token, handle.id(), slot);
            }
        }
        if let Some(pending) = pending {
            room_service::schedule_continuation(state, handle.id(), pending);
        }
        restored += 1;
    }

    info!(restored, "restored rooms from storage");
    Ok(restored)
}

async fn discard_corrupt(store: &Arc<dyn RoomStore>, err: &StorageError) -> Result<(), StorageError> {
    warn!(error = %err, "stored rooms are corrupt; clearing storage and starting empty");
    store.clear().await
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::room_store::file::FileRoomStore,
        state::{AppState, board::Board, room::Room},
    };

    async fn file_store(dir: &std::path::Path) -> Arc<dyn RoomStore> {
        Arc::new(FileRoomStore::open(dir).await.unwrap())
    }

    #[tokio::test]
    async fn rooms_stay_dirty_without_a_store() {
        let state = AppState::new(AppConfig::default());
        let handle = state.insert_room(Room::new(Arc::new(Board::default()), 100)).await;

        assert_eq!(flush_dirty(&state).await, 0);
        assert!(handle.is_dirty());
    }

    #[tokio::test]
    async fn flushed_rooms_are_restored_with_their_sessions() {
        let dir = tempdir().unwrap();
        let store = file_store(dir.path()).await;

        let state = AppState::new(AppConfig::default());
        state.install_room_store(Arc::clone(&store)).await;
        let mut room = Room::new(state.config().board(), 100);
        {
            let player = room.player_mut(2).unwrap();
            player.session_token = Some("stored-token".into());
            player.connected = true;
        }
        let id = room.id;
        state.insert_room(room).await;
        assert_eq!(flush_dirty(&state).await, 1);
        assert_eq!(flush_dirty(&state).await, 0);

        let fresh = AppState::new(AppConfig::default());
        assert_eq!(restore(&fresh, &store).await.unwrap(), 1);
        let entry = fresh.sessions().resolve("stored-token").unwrap();
        assert_eq!(entry.room_id, id);
        assert_eq!(entry.slot, 2);
        let handle = fresh.room(id).await.unwrap();
        assert!(!handle.is_dirty());
        assert!(handle.lock().await.player(2).unwrap().connection.is_none());

        assert_eq!(restore(&fresh, &store).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn corrupt_snapshot_clears_the_store() {
        let dir = tempdir().unwrap();
        let store = file_store(dir.path()).await;
        std::fs::write(dir.path().join(format!("{}.json", uuid::Uuid::new_v4())), b"[]").unwrap();

        let state = AppState::new(AppConfig::default());
        assert_eq!(restore(&state, &store).await.unwrap(), 0);
        assert!(state.room_handles().await.is_empty());
        assert!(store.load_rooms().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn shutdown_flush_rewrites_every_room() {
        let dir = tempdir().unwrap();
        let store = file_store(dir.path()).await;
        let state = AppState::new(AppConfig::default());
        state.install_room_store(store).await;
        for _ in 0..2 {
            let handle = state.insert_room(Room::new(state.config().board(), 100)).await;
            handle.take_dirty();
        }

        assert_eq!(flush_all(&state).await, 2);
    }
}
