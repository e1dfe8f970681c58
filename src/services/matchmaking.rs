//! Seat assignment: reconnect-by-token first, then the first free seat in
//! creation order, then a brand new room.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dto::{
        room::{RoomView, board_view},
        ws::{JoinPayload, ServerMessage},
    },
    error::ServiceError,
    services::room_service,
    state::{
        RoomHandle, SharedState,
        engine::{self, Outcome},
        room::{ConnectionId, Room, Slot},
    },
};

/// Where a connection ended up after joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    /// Room the connection is seated in.
    pub room_id: Uuid,
    /// Seat held by the connection.
    pub slot: Slot,
    /// The connection itself.
    pub connection: ConnectionId,
}

/// Attach `connection` to a seat for the session named in `payload`.
///
/// The caller is expected to have validated the payload.
pub async fn join(
    state: &SharedState,
    connection: ConnectionId,
    payload: &JoinPayload,
) -> Result<Binding, ServiceError> {
    let _gate = state.join_gate().lock().await;

    if let Some(binding) = reattach(state, connection, &payload.session_token).await? {
        return Ok(binding);
    }

    let display_name = payload.trimmed_name();
    for handle in state.room_handles().await {
        let mut room = handle.lock().await;
        if room.is_ended() {
            continue;
        }
        let Some(slot) = room.free_slot() else {
            continue;
        };
        return seat(state, &handle, &mut room, slot, payload, display_name, connection);
    }

    if let Some(max_rooms) = state.config().max_rooms() {
        let open = state.rooms().read().await.len();
        if open >= max_rooms {
            debug!(open, max_rooms, "room limit reached");
            return Err(ServiceError::RoomFull);
        }
    }

    let room = Room::new(state.config().board(), state.config().rules().starting_sanity);
    let handle = state.insert_room(room).await;
    info!(room_id = %handle.id(), "room created");
    let mut room = handle.lock().await;
    seat(state, &handle, &mut room, 1, payload, display_name, connection)
}

async fn reattach(
    state: &SharedState,
    connection: ConnectionId,
    token: &str,
) -> Result<Option<Binding>, ServiceError> {
    let Some(entry) = state.sessions().resolve(token) else {
        return Ok(None);
    };
    let Some(handle) = state.room(entry.room_id).await else {
        debug!(room_id = %entry.room_id, "session points to an evicted room");
        return Ok(None);
    };

    let mut room = handle.lock().await;
    let previous = room
        .player(entry.slot)
        .and_then(|player| player.connection)
        .filter(|previous| *previous != connection);
    let outcome = engine::reattach(&mut room, entry.slot, connection)?;

    if let Some(previous) = previous {
        info!(room_id = %handle.id(), slot = entry.slot, %previous, "connection superseded");
        state.close_connection(previous);
    }

    send_init(state, &room, entry.slot, connection);
    room_service::publish(state, &handle, &room, outcome);

    Ok(Some(Binding {
        room_id: handle.id(),
        slot: entry.slot,
        connection,
    }))
}

fn seat(
    state: &SharedState,
    handle: &Arc<RoomHandle>,
    room: &mut Room,
    slot: Slot,
    payload: &JoinPayload,
    display_name: String,
    connection: ConnectionId,
) -> Result<Binding, ServiceError> {
    let outcome: Outcome = engine::seat(
        room,
        state.config().rules(),
        slot,
        payload.session_token.clone(),
        display_name,
        connection,
    )?;
    state
        .sessions()
        .bind(payload.session_token.clone(), handle.id(), slot);
    info!(room_id = %handle.id(), slot, "session seated");

    send_init(state, room, slot, connection);
    room_service::publish(state, handle, room, outcome);

    Ok(Binding {
        room_id: handle.id(),
        slot,
        connection,
    })
}

fn send_init(state: &SharedState, room: &Room, slot: Slot, connection: ConnectionId) {
    let init = ServerMessage::Init {
        slot,
        room: RoomView::from(room),
        board: board_view(&room.board),
    };
    state.send_to(connection, &init, "init");
}
