use std::{collections::BTreeSet, sync::Arc, time::SystemTime};

use uuid::Uuid;

use crate::state::{
    board::Board,
    state_machine::{TurnPhase, TurnStateMachine},
};

/// Seat number inside a room, `1..=MAX_PLAYERS`.
pub type Slot = u8;
/// Identifier of a live transport connection.
pub type ConnectionId = Uuid;

/// Number of seats in every room.
pub const MAX_PLAYERS: usize = 4;

/// One seat of a room and the stats of whoever occupies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Seat number.
    pub slot: Slot,
    /// Opaque client token bound to this seat, stable once assigned.
    pub session_token: Option<String>,
    /// Live connection currently attached to the seat.
    pub connection: Option<ConnectionId>,
    /// Name shown to other players.
    pub display_name: String,
    /// Index of the tile the player stands on.
    pub position: usize,
    /// Remaining sanity; reaching zero eliminates the player.
    pub sanity: i32,
    /// Tiles owned by the player.
    pub owned: BTreeSet<usize>,
    /// Whether a transport is believed to be attached.
    pub connected: bool,
    /// Whether the player lost this round.
    pub eliminated: bool,
}

impl Player {
    /// An unoccupied seat.
    pub fn empty(slot: Slot, starting_sanity: i32) -> Self {
        Self {
            slot,
            session_token: None,
            connection: None,
            display_name: default_display_name(slot),
            position: 0,
            sanity: starting_sanity,
            owned: BTreeSet::new(),
            connected: false,
            eliminated: false,
        }
    }

    /// Whether a session is bound to the seat.
    pub fn is_seated(&self) -> bool {
        self.session_token.is_some()
    }

    /// Session-bound and still in the round.
    pub fn is_eligible(&self) -> bool {
        self.is_seated() && !self.eliminated
    }

    /// Eligible and currently connected, i.e. able to take a turn.
    pub fn can_take_turn(&self) -> bool {
        self.is_eligible() && self.connected
    }

    /// Reset per-round stats, keeping session binding and connectivity.
    pub fn reset_stats(&mut self, starting_sanity: i32) {
        self.position = 0;
        self.sanity = starting_sanity;
        self.owned.clear();
        self.eliminated = false;
    }
}

/// Placeholder name for seats without a chosen name.
pub fn default_display_name(slot: Slot) -> String {
    format!("Player {slot}")
}

/// Pending two-party negotiation freezing the turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    /// Slot making the offer.
    pub proposer: Slot,
    /// Slot owning the requested tile; the only one allowed to answer.
    pub owner: Slot,
    /// Requested tile.
    pub tile: usize,
    /// Sanity offered in exchange.
    pub offer_amount: i32,
    /// Phase resumed once the trade is answered.
    pub phase_to_restore: TurnPhase,
}

/// Delayed transition scheduled by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Apply the recorded dice roll once the animation finished.
    ResolveRoll,
    /// End the turn (or eliminate) once the event outcome was displayed.
    FinishEvent,
    /// One second of the restart countdown elapsed.
    CountdownTick {
        /// Seconds remaining before this tick is applied.
        seconds_left: u32,
    },
}

/// A scheduled continuation together with the version it expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingContinuation {
    /// Work to perform.
    pub continuation: Continuation,
    /// State machine version when the continuation was scheduled.
    pub version: u64,
}

/// Single game instance.
#[derive(Debug, Clone)]
pub struct Room {
    /// Primary key of the room.
    pub id: Uuid,
    /// The four seats, index `slot - 1`.
    pub players: [Player; MAX_PLAYERS],
    /// Slot whose turn it is.
    pub current_slot: Slot,
    /// Turn-phase state machine.
    pub machine: TurnStateMachine,
    /// Active trade, if any.
    pub trade: Option<Trade>,
    /// Continuation scheduled but not yet applied.
    pub pending: Option<PendingContinuation>,
    /// Last dice value drawn, kept until the roll is resolved.
    pub last_roll: Option<u8>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time anything mutated the room.
    pub last_activity: SystemTime,
    /// Board shared with the other rooms.
    pub board: Arc<Board>,
}

impl Room {
    /// Build an empty room waiting for players.
    pub fn new(board: Arc<Board>, starting_sanity: i32) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            players: std::array::from_fn(|index| Player::empty(index as Slot + 1, starting_sanity)),
            current_slot: 1,
            machine: TurnStateMachine::new(),
            trade: None,
            pending: None,
            last_roll: None,
            created_at: now,
            last_activity: now,
            board,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> &TurnPhase {
        self.machine.phase()
    }

    /// Whether the round is over.
    pub fn is_ended(&self) -> bool {
        self.phase().is_ended()
    }

    /// Seat lookup; `None` for out-of-range slots.
    pub fn player(&self, slot: Slot) -> Option<&Player> {
        slot.checked_sub(1)
            .and_then(|index| self.players.get(index as usize))
    }

    /// Mutable seat lookup; `None` for out-of-range slots.
    pub fn player_mut(&mut self, slot: Slot) -> Option<&mut Player> {
        slot.checked_sub(1)
            .and_then(|index| self.players.get_mut(index as usize))
    }

    /// Slot owning `tile`, if any.
    pub fn owner_of(&self, tile: usize) -> Option<Slot> {
        self.players
            .iter()
            .find(|player| player.owned.contains(&tile))
            .map(|player| player.slot)
    }

    /// Slot bound to the given connection.
    pub fn slot_of_connection(&self, connection: ConnectionId) -> Option<Slot> {
        self.players
            .iter()
            .find(|player| player.connection == Some(connection))
            .map(|player| player.slot)
    }

    /// First seat without a session, if the room can take a newcomer.
    pub fn free_slot(&self) -> Option<Slot> {
        self.players
            .iter()
            .find(|player| !player.is_seated() && !player.eliminated)
            .map(|player| player.slot)
    }

    /// Number of session-bound, non-eliminated players.
    pub fn eligible_count(&self) -> usize {
        self.players.iter().filter(|player| player.is_eligible()).count()
    }

    /// Number of players able to take a turn right now.
    pub fn active_count(&self) -> usize {
        self.players
            .iter()
            .filter(|player| player.can_take_turn())
            .count()
    }

    /// Live connections attached to the room.
    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.players.iter().filter_map(|player| player.connection)
    }

    /// Refresh the activity timestamp.
    pub fn touch(&mut self) {
        self.last_activity = SystemTime::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_room_has_four_empty_seats() {
        let room = Room::new(Arc::new(Board::default()), 100);
        assert_eq!(room.phase(), &TurnPhase::Waiting);
        assert_eq!(room.free_slot(), Some(1));
        assert_eq!(room.eligible_count(), 0);
        assert!(room.player(0).is_none());
        assert!(room.player(5).is_none());
        assert_eq!(room.player(4).map(|p| p.slot), Some(4));
    }

    #[test]
    fn owner_lookup_scans_every_seat() {
        let mut room = Room::new(Arc::new(Board::default()), 100);
        room.player_mut(3).unwrap().owned.insert(11);
        assert_eq!(room.owner_of(11), Some(3));
        assert_eq!(room.owner_of(12), None);
    }
}
