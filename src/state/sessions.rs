use dashmap::DashMap;
use uuid::Uuid;

use crate::state::room::Slot;

/// Seat a session token is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEntry {
    /// Room holding the seat.
    pub room_id: Uuid,
    /// Seat number inside the room.
    pub slot: Slot,
}

/// Maps opaque session tokens to the seat they own.
///
/// Entries live as long as their room; they are only dropped when the room is evicted.
#[derive(Debug, Default)]
pub struct SessionDirectory {
    entries: DashMap<String, SessionEntry>,
}

impl SessionDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seat bound to `token`, if any.
    pub fn resolve(&self, token: &str) -> Option<SessionEntry> {
        self.entries.get(token).map(|entry| *entry.value())
    }

    /// Bind `token` to a seat, replacing any previous binding.
    pub fn bind(&self, token: impl Into<String>, room_id: Uuid, slot: Slot) {
        self.entries
            .insert(token.into(), SessionEntry { room_id, slot });
    }

    /// Drop every binding pointing at `room_id`, returning how many were removed.
    pub fn forget_room(&self, room_id: Uuid) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.room_id != room_id);
        before - self.entries.len()
    }

    /// Number of bound sessions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no session is bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forgetting_a_room_keeps_other_rooms() {
        let directory = SessionDirectory::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        directory.bind("alpha-token", first, 1);
        directory.bind("bravo-token", first, 2);
        directory.bind("charlie-token", second, 1);

        assert_eq!(directory.forget_room(first), 2);
        assert!(directory.resolve("alpha-token").is_none());
        assert_eq!(
            directory.resolve("charlie-token"),
            Some(SessionEntry {
                room_id: second,
                slot: 1
            })
        );
    }
}
