use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, sync::Arc, time::SystemTime};
use uuid::Uuid;

use crate::{
    dao::storage::StorageError,
    state::{
        board::{Board, Tile, TileKind},
        room::{
            Continuation, MAX_PLAYERS, PendingContinuation, Player, Room, Slot, Trade,
        },
        state_machine::{TurnPhase, TurnStateMachine},
    },
};

/// Durable representation of a room, one record per room keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomEntity {
    /// Primary key of the room.
    pub id: Uuid,
    /// Turn phase at the time of the snapshot.
    pub phase: PhaseEntity,
    /// State machine version, needed to revalidate the pending continuation.
    pub version: u64,
    /// Slot whose turn it is.
    pub current_slot: Slot,
    /// The four seats in slot order.
    pub players: Vec<PlayerEntity>,
    /// Open trade, if any.
    pub trade: Option<TradeEntity>,
    /// Continuation that was scheduled but had not fired yet.
    pub pending: Option<PendingEntity>,
    /// Dice value awaiting resolution.
    pub last_roll: Option<u8>,
    /// Board the room was playing on.
    pub board: Vec<TileEntity>,
    /// Creation time, used to restore rooms in order.
    pub created_at: SystemTime,
    /// Last accepted command, used for idle eviction.
    pub last_activity: SystemTime,
}

/// Persisted seat. Live connection references are never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Seat number, 1 to 4.
    pub slot: Slot,
    /// Session bound to the seat, if any.
    pub session_token: Option<String>,
    /// Name shown to the other players.
    pub display_name: String,
    /// Board index of the player's token.
    pub position: usize,
    /// Current sanity.
    pub sanity: i32,
    /// Indices of owned property tiles.
    pub owned: Vec<usize>,
    /// Connectivity at snapshot time.
    pub connected: bool,
    /// Out of the current round.
    pub eliminated: bool,
}

/// Persisted trade offer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TradeEntity {
    /// Slot making the offer.
    pub proposer: Slot,
    /// Slot owning the tile.
    pub owner: Slot,
    /// Tile being bought.
    pub tile: usize,
    /// Sanity offered.
    pub offer_amount: i32,
    /// Phase resumed once the trade closes.
    pub phase_to_restore: PhaseEntity,
}

/// Persisted turn phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseEntity {
    /// Fewer than two players connected.
    Waiting,
    /// Current player may roll.
    Roll,
    /// A move or event is being shown.
    Animating,
    /// Current player may buy `tile` for `price`.
    Decision {
        /// Tile on offer.
        tile: usize,
        /// Purchase price.
        price: i32,
    },
    /// A trade froze the turn.
    Trading,
    /// Round won by `winner`.
    Ended {
        /// Winning slot.
        winner: Slot,
    },
}

/// Persisted scheduled continuation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingEntity {
    /// What to run when the timer fires.
    pub continuation: ContinuationEntity,
    /// State machine version the continuation was scheduled at.
    pub version: u64,
}

/// Persisted continuation kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContinuationEntity {
    /// Move the current player by the pending roll.
    ResolveRoll,
    /// End the turn after an event was displayed.
    FinishEvent,
    /// Next restart countdown step.
    CountdownTick {
        /// Seconds announced by this tick.
        seconds_left: u32,
    },
}

/// Persisted tile type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TileKindEntity {
    /// Start tile.
    Start,
    /// Ownable property.
    Property {
        /// Purchase price.
        price: i32,
        /// Rent paid by visitors.
        rent: i32,
        /// Colour group.
        #[serde(default)]
        group: String,
    },
    /// Random event.
    Event,
    /// Fixed sanity loss.
    Tax {
        /// Sanity lost.
        cost: i32,
    },
    /// Jail, reached by send-to-jail tiles.
    Jail,
    /// Moves the player to jail.
    SendToJail,
    /// Nothing happens.
    FreeRest,
}

/// Persisted board tile with its parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TileEntity {
    /// Display name.
    pub name: String,
    /// Tile type and numeric parameters.
    #[serde(flatten)]
    pub kind: TileKindEntity,
}

impl From<&TurnPhase> for PhaseEntity {
    fn from(value: &TurnPhase) -> Self {
        match value {
            TurnPhase::Waiting => PhaseEntity::Waiting,
            TurnPhase::Roll => PhaseEntity::Roll,
            TurnPhase::Animating => PhaseEntity::Animating,
            TurnPhase::Decision { tile, price } => PhaseEntity::Decision {
                tile: *tile,
                price: *price,
            },
            TurnPhase::Trading => PhaseEntity::Trading,
            TurnPhase::Ended { winner } => PhaseEntity::Ended { winner: *winner },
        }
    }
}

impl From<PhaseEntity> for TurnPhase {
    fn from(value: PhaseEntity) -> Self {
        match value {
            PhaseEntity::Waiting => TurnPhase::Waiting,
            PhaseEntity::Roll => TurnPhase::Roll,
            PhaseEntity::Animating => TurnPhase::Animating,
            PhaseEntity::Decision { tile, price } => TurnPhase::Decision { tile, price },
            PhaseEntity::Trading => TurnPhase::Trading,
            PhaseEntity::Ended { winner } => TurnPhase::Ended { winner },
        }
    }
}

impl From<PendingContinuation> for PendingEntity {
    fn from(value: PendingContinuation) -> Self {
        let continuation = match value.continuation {
            Continuation::ResolveRoll => ContinuationEntity::ResolveRoll,
            Continuation::FinishEvent => ContinuationEntity::FinishEvent,
            Continuation::CountdownTick { seconds_left } => {
                ContinuationEntity::CountdownTick { seconds_left }
            }
        };
        Self {
            continuation,
            version: value.version,
        }
    }
}

impl From<PendingEntity> for PendingContinuation {
    fn from(value: PendingEntity) -> Self {
        let continuation = match value.continuation {
            ContinuationEntity::ResolveRoll => Continuation::ResolveRoll,
            ContinuationEntity::FinishEvent => Continuation::FinishEvent,
            ContinuationEntity::CountdownTick { seconds_left } => {
                Continuation::CountdownTick { seconds_left }
            }
        };
        Self {
            continuation,
            version: value.version,
        }
    }
}

impl From<&Tile> for TileEntity {
    fn from(value: &Tile) -> Self {
        let kind = match &value.kind {
            TileKind::Start => TileKindEntity::Start,
            TileKind::Property { price, rent, group } => TileKindEntity::Property {
                price: *price,
                rent: *rent,
                group: group.clone(),
            },
            TileKind::Event => TileKindEntity::Event,
            TileKind::Tax { cost } => TileKindEntity::Tax { cost: *cost },
            TileKind::Jail => TileKindEntity::Jail,
            TileKind::SendToJail => TileKindEntity::SendToJail,
            TileKind::FreeRest => TileKindEntity::FreeRest,
        };
        Self {
            name: value.name.clone(),
            kind,
        }
    }
}

impl From<TileEntity> for Tile {
    fn from(value: TileEntity) -> Self {
        let kind = match value.kind {
            TileKindEntity::Start => TileKind::Start,
            TileKindEntity::Property { price, rent, group } => {
                TileKind::Property { price, rent, group }
            }
            TileKindEntity::Event => TileKind::Event,
            TileKindEntity::Tax { cost } => TileKind::Tax { cost },
            TileKindEntity::Jail => TileKind::Jail,
            TileKindEntity::SendToJail => TileKind::SendToJail,
            TileKindEntity::FreeRest => TileKind::FreeRest,
        };
        Self {
            name: value.name,
            kind,
        }
    }
}

impl From<&Player> for PlayerEntity {
    fn from(value: &Player) -> Self {
        Self {
            slot: value.slot,
            session_token: value.session_token.clone(),
            display_name: value.display_name.clone(),
            position: value.position,
            sanity: value.sanity,
            owned: value.owned.iter().copied().collect(),
            connected: value.connected,
            eliminated: value.eliminated,
        }
    }
}

impl From<&Room> for RoomEntity {
    fn from(room: &Room) -> Self {
        Self {
            id: room.id,
            phase: room.phase().into(),
            version: room.machine.version(),
            current_slot: room.current_slot,
            players: room.players.iter().map(PlayerEntity::from).collect(),
            trade: room.trade.as_ref().map(|trade| TradeEntity {
                proposer: trade.proposer,
                owner: trade.owner,
                tile: trade.tile,
                offer_amount: trade.offer_amount,
                phase_to_restore: (&trade.phase_to_restore).into(),
            }),
            pending: room.pending.map(Into::into),
            last_roll: room.last_roll,
            board: room.board.tiles().iter().map(TileEntity::from).collect(),
            created_at: room.created_at,
            last_activity: room.last_activity,
        }
    }
}

impl RoomEntity {
    /// Rebuild the in-memory room. Connection references are always cleared.
    ///
    /// `shared` is reused when the stored board matches it, so restored rooms
    /// keep sharing one board with freshly created ones.
    pub fn into_room(self, shared: &Arc<Board>) -> Result<Room, StorageError> {
        let key = self.id.to_string();
        let tiles: Vec<Tile> = self.board.into_iter().map(Tile::from).collect();
        let board = if tiles.as_slice() == shared.tiles() {
            Arc::clone(shared)
        } else {
            Arc::new(Board::new(tiles).map_err(|err| StorageError::corrupt(&key, err))?)
        };

        if self.players.len() != MAX_PLAYERS {
            return Err(StorageError::corrupt(
                &key,
                format!("expected {MAX_PLAYERS} seats, found {}", self.players.len()),
            ));
        }
        if !(1..=MAX_PLAYERS as Slot).contains(&self.current_slot) {
            return Err(StorageError::corrupt(
                &key,
                format!("current slot {} out of range", self.current_slot),
            ));
        }

        let mut seen = BTreeSet::new();
        let mut players = Vec::with_capacity(MAX_PLAYERS);
        for (index, entity) in self.players.into_iter().enumerate() {
            let slot = index as Slot + 1;
            if entity.slot != slot {
                return Err(StorageError::corrupt(
                    &key,
                    format!("seat {index} holds slot {}", entity.slot),
                ));
            }
            for tile in &entity.owned {
                if *tile >= board.len() || !seen.insert(*tile) {
                    return Err(StorageError::corrupt(
                        &key,
                        format!("tile {tile} is out of range or owned twice"),
                    ));
                }
            }
            players.push(Player {
                slot,
                session_token: entity.session_token,
                connection: None,
                display_name: entity.display_name,
                position: entity.position % board.len(),
                sanity: entity.sanity,
                owned: entity.owned.into_iter().collect(),
                connected: entity.connected,
                eliminated: entity.eliminated,
            });
        }
        let players: [Player; MAX_PLAYERS] = players
            .try_into()
            .map_err(|_| StorageError::corrupt(&key, "seat count changed"))?;

        Ok(Room {
            id: self.id,
            players,
            current_slot: self.current_slot,
            machine: TurnStateMachine::restore(self.phase.into(), self.version),
            trade: self.trade.map(|trade| Trade {
                proposer: trade.proposer,
                owner: trade.owner,
                tile: trade.tile,
                offer_amount: trade.offer_amount,
                phase_to_restore: trade.phase_to_restore.into(),
            }),
            pending: self.pending.map(Into::into),
            last_roll: self.last_roll,
            created_at: self.created_at,
            last_activity: self.last_activity,
            board,
        })
    }
}
