//! Read-only projections of the room registry for operators.

use uuid::Uuid;

use crate::{
    dto::{
        public::{RoomSummary, RoomsResponse},
        room::RoomView,
    },
    error::ServiceError,
    state::SharedState,
};

/// Summaries of every room in creation order, plus the degraded flag.
pub async fn list_rooms(state: &SharedState) -> RoomsResponse {
    let mut rooms = Vec::new();
    for handle in state.room_handles().await {
        let room = handle.lock().await;
        rooms.push(RoomSummary::from(&*room));
    }

    RoomsResponse {
        rooms,
        degraded: state.is_degraded(),
    }
}

/// Full public view of one room.
pub async fn get_room(state: &SharedState, id: Uuid) -> Result<RoomView, ServiceError> {
    let handle = state
        .room(id)
        .await
        .ok_or_else(|| ServiceError::NotFound(format!("room `{id}` not found")))?;
    let room = handle.lock().await;
    Ok(RoomView::from(&*room))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        state::{AppState, room::Room},
    };

    #[tokio::test]
    async fn lists_rooms_in_creation_order() {
        let state = AppState::new(AppConfig::default());
        let first = state.insert_room(Room::new(state.config().board(), 100)).await;
        let second = state.insert_room(Room::new(state.config().board(), 100)).await;

        let listing = list_rooms(&state).await;
        let ids: Vec<Uuid> = listing.rooms.iter().map(|room| room.id).collect();
        assert_eq!(ids, vec![first.id(), second.id()]);
        assert!(listing.degraded);
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let state = AppState::new(AppConfig::default());
        let err = get_room(&state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
