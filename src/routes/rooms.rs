use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::{public::RoomsResponse, room::RoomView},
    error::AppError,
    services::public_service,
    state::SharedState,
};

/// Read-only room endpoints for operators.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", get(list_rooms))
        .route("/rooms/{id}", get(get_room))
}

#[utoipa::path(
    get,
    path = "/rooms",
    tag = "rooms",
    responses((status = 200, description = "Rooms in creation order", body = RoomsResponse))
)]
/// List every room held in memory.
pub async fn list_rooms(State(state): State<SharedState>) -> Json<RoomsResponse> {
    Json(public_service::list_rooms(&state).await)
}

#[utoipa::path(
    get,
    path = "/rooms/{id}",
    tag = "rooms",
    params(("id" = Uuid, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Public view of the room", body = RoomView),
        (status = 404, description = "Unknown room")
    )
)]
/// Return the public view of a single room.
pub async fn get_room(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoomView>, AppError> {
    let payload = public_service::get_room(&state, id).await?;
    Ok(Json(payload))
}
