use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::{format_system_time, phase::VisibleTurnPhase},
    state::room::Room,
};

/// Operator-facing summary of one room.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomSummary {
    /// Room identifier.
    pub id: Uuid,
    /// Current turn phase.
    pub phase: VisibleTurnPhase,
    /// Seats bound to a session.
    pub seated: usize,
    /// Seats with a live transport.
    pub connected: usize,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 time of the last mutation.
    pub last_activity: String,
}

impl From<&Room> for RoomSummary {
    fn from(room: &Room) -> Self {
        Self {
            id: room.id,
            phase: room.phase().into(),
            seated: room.players.iter().filter(|p| p.is_seated()).count(),
            connected: room.players.iter().filter(|p| p.connected).count(),
            created_at: format_system_time(room.created_at),
            last_activity: format_system_time(room.last_activity),
        }
    }
}

/// Response listing every room in creation order.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomsResponse {
    /// Rooms in creation order.
    pub rooms: Vec<RoomSummary>,
    /// Whether room storage is currently unavailable.
    pub degraded: bool,
}
