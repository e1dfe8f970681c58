use serde::Serialize;
use utoipa::ToSchema;

use crate::state::{room::Slot, state_machine::TurnPhase};

/// Turn phase exposed to clients (WebSocket and REST).
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VisibleTurnPhase {
    /// Waiting for a second player.
    Waiting,
    /// The current player may roll.
    Roll,
    /// Dice or an event outcome are on screen.
    Animating,
    /// The current player may buy the tile they landed on.
    Decision {
        /// Tile on sale.
        tile: usize,
        /// Asking price.
        price: i32,
    },
    /// A trade offer is awaiting an answer.
    Trading,
    /// The round is over.
    Ended {
        /// Winning seat.
        winner: Slot,
    },
}

impl From<&TurnPhase> for VisibleTurnPhase {
    fn from(value: &TurnPhase) -> Self {
        match value {
            TurnPhase::Waiting => VisibleTurnPhase::Waiting,
            TurnPhase::Roll => VisibleTurnPhase::Roll,
            TurnPhase::Animating => VisibleTurnPhase::Animating,
            TurnPhase::Decision { tile, price } => VisibleTurnPhase::Decision {
                tile: *tile,
                price: *price,
            },
            TurnPhase::Trading => VisibleTurnPhase::Trading,
            TurnPhase::Ended { winner } => VisibleTurnPhase::Ended { winner: *winner },
        }
    }
}
