use thiserror::Error;

use crate::state::room::Slot;

/// Phases a room's turn machine can be in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPhase {
    /// Fewer than two eligible players; nobody can act.
    Waiting,
    /// The current player may roll.
    Roll,
    /// Dice are rolling or an event outcome is displayed; a continuation is pending.
    Animating,
    /// The current player decides whether to buy the tile they landed on.
    Decision {
        /// Tile offered for purchase.
        tile: usize,
        /// Price recorded when the offer was made.
        price: i32,
    },
    /// A trade is awaiting the owner's answer; the turn is frozen.
    Trading,
    /// Exactly one eligible player remains; a restart countdown is running.
    Ended {
        /// Slot of the last player standing.
        winner: Slot,
    },
}

impl TurnPhase {
    /// Whether the round is over and commands are frozen.
    pub fn is_ended(&self) -> bool {
        matches!(self, TurnPhase::Ended { .. })
    }
}

/// Events that can be applied to the turn machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// Enough players are seated; the first turn begins.
    Start,
    /// The current player rolled the dice.
    DiceThrown,
    /// The landed tile can be bought.
    PurchaseOffered {
        /// Tile offered for purchase.
        tile: usize,
        /// Price at the time of the offer.
        price: i32,
    },
    /// The turn is over; the next player may roll.
    TurnEnded,
    /// A trade offer froze the turn.
    TradeOpened,
    /// The trade was answered; resume where the turn was frozen.
    TradeClosed {
        /// Phase captured when the trade was opened.
        restore: TurnPhase,
    },
    /// A single eligible player remains.
    GameWon {
        /// Slot of the winner.
        winner: Slot,
    },
    /// Countdown expired; begin a fresh round.
    RoundReset {
        /// Whether at least two eligible players remain seated.
        playable: bool,
    },
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: TurnPhase,
    /// The event that cannot be applied from this phase.
    pub event: TurnEvent,
}

/// Turn-phase state machine of a single room.
///
/// Every applied transition bumps `version`, which scheduled continuations
/// capture so they can detect that the room moved on while they slept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnStateMachine {
    phase: TurnPhase,
    version: u64,
}

impl Default for TurnStateMachine {
    fn default() -> Self {
        Self {
            phase: TurnPhase::Waiting,
            version: 0,
        }
    }
}

impl TurnStateMachine {
    /// Create a new state machine waiting for players.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a machine from persisted values.
    pub fn restore(phase: TurnPhase, version: u64) -> Self {
        Self { phase, version }
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> &TurnPhase {
        &self.phase
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Validate and apply `event`, returning the new phase.
    pub fn apply(&mut self, event: TurnEvent) -> Result<TurnPhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        self.version += 1;
        Ok(self.phase.clone())
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: TurnEvent) -> Result<TurnPhase, InvalidTransition> {
        let next = match (self.phase.clone(), event) {
            (TurnPhase::Waiting, TurnEvent::Start) => TurnPhase::Roll,
            (TurnPhase::Roll, TurnEvent::DiceThrown) => TurnPhase::Animating,
            (TurnPhase::Animating, TurnEvent::PurchaseOffered { tile, price }) => {
                TurnPhase::Decision { tile, price }
            }
            (TurnPhase::Animating | TurnPhase::Decision { .. } | TurnPhase::Roll, TurnEvent::TurnEnded) => {
                TurnPhase::Roll
            }
            (TurnPhase::Roll | TurnPhase::Decision { .. }, TurnEvent::TradeOpened) => {
                TurnPhase::Trading
            }
            (TurnPhase::Trading, TurnEvent::TradeClosed { restore })
                if !matches!(restore, TurnPhase::Trading | TurnPhase::Ended { .. }) =>
            {
                restore
            }
            (
                TurnPhase::Roll
                | TurnPhase::Animating
                | TurnPhase::Decision { .. }
                | TurnPhase::Trading,
                TurnEvent::GameWon { winner },
            ) => TurnPhase::Ended { winner },
            (TurnPhase::Ended { .. }, TurnEvent::RoundReset { playable: true }) => TurnPhase::Roll,
            (TurnPhase::Ended { .. }, TurnEvent::RoundReset { playable: false }) => {
                TurnPhase::Waiting
            }
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
