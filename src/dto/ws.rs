use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{
        room::{RoomView, TileView, TradeView},
        validation::{validate_display_name, validate_session_token},
    },
    state::{
        engine::{Polarity, RoomEvent, Severity},
        room::Slot,
    },
};

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
/// First message of every connection: claim or reclaim a seat.
pub struct JoinPayload {
    /// Opaque token identifying the player across reconnects.
    #[validate(custom(function = "validate_session_token"))]
    pub session_token: String,
    /// Name shown to the other players.
    #[validate(custom(function = "validate_display_name"))]
    pub display_name: String,
}

impl JoinPayload {
    /// Display name with surrounding whitespace removed.
    pub fn trimmed_name(&self) -> String {
        self.display_name.trim().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
/// Answer to a purchase offer.
pub enum DecisionChoice {
    Buy,
    Pass,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
/// Messages accepted from player WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Join(JoinPayload),
    Roll,
    Decide {
        choice: DecisionChoice,
    },
    OfferTrade {
        tile_index: usize,
        offer_amount: i32,
    },
    RespondTrade {
        accepted: bool,
    },
}

/// Why an inbound frame could not be turned into a [`ClientCommand`].
#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid join payload: {0}")]
    Invalid(#[from] ValidationErrors),
}

impl ClientCommand {
    /// Parse a text frame and validate the join payload if present.
    pub fn from_json_str(text: &str) -> Result<Self, CommandParseError> {
        let command: ClientCommand = serde_json::from_str(text)?;
        if let ClientCommand::Join(payload) = &command {
            payload.validate()?;
        }
        Ok(command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
/// Direction of an event outcome shown to clients.
pub enum EventPolarity {
    Gain,
    Loss,
}

impl From<Polarity> for EventPolarity {
    fn from(value: Polarity) -> Self {
        match value {
            Polarity::Gain => EventPolarity::Gain,
            Polarity::Loss => EventPolarity::Loss,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
/// Presentation hint of a log line.
pub enum LogSeverity {
    Info,
    Success,
    Warn,
    Danger,
    Error,
}

impl From<Severity> for LogSeverity {
    fn from(value: Severity) -> Self {
        match value {
            Severity::Info => LogSeverity::Info,
            Severity::Success => LogSeverity::Success,
            Severity::Warning => LogSeverity::Warn,
            Severity::Danger => LogSeverity::Danger,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
/// Messages pushed to player WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Init {
        slot: Slot,
        room: RoomView,
        board: Vec<TileView>,
    },
    StateUpdate {
        room: RoomView,
    },
    DiceAnimation {
        roll: u8,
        slot: Slot,
    },
    EventOutcome {
        title: String,
        description: String,
        polarity: EventPolarity,
    },
    TradeRequest {
        trade: TradeView,
    },
    RoomFull,
    GameOver {
        winner_name: String,
    },
    RestartCountdown {
        seconds_left: u32,
    },
    Log {
        message: String,
        severity: LogSeverity,
    },
}

impl ServerMessage {
    /// Log line helper.
    pub fn log(message: impl Into<String>, severity: LogSeverity) -> Self {
        ServerMessage::Log {
            message: message.into(),
            severity,
        }
    }

    /// Wire form of a room event meant for every connection of the room.
    ///
    /// Returns `None` for targeted events such as trade requests.
    pub fn broadcast_form(event: &RoomEvent) -> Option<Self> {
        let message = match event {
            RoomEvent::DiceRolled { slot, roll } => ServerMessage::DiceAnimation {
                roll: *roll,
                slot: *slot,
            },
            RoomEvent::EventOutcome {
                slot,
                polarity,
                amount,
            } => {
                let (title, description) = match polarity {
                    Polarity::Gain => (
                        "A Moment of Clarity",
                        format!("P{slot} regains {amount} sanity."),
                    ),
                    Polarity::Loss => (
                        "Maddening Visions",
                        format!("P{slot} loses {amount} sanity."),
                    ),
                };
                ServerMessage::EventOutcome {
                    title: title.to_string(),
                    description,
                    polarity: (*polarity).into(),
                }
            }
            RoomEvent::TradeRequested(_) => return None,
            RoomEvent::GameOver { winner_name, .. } => ServerMessage::GameOver {
                winner_name: winner_name.clone(),
            },
            RoomEvent::Countdown { seconds_left } => ServerMessage::RestartCountdown {
                seconds_left: *seconds_left,
            },
            RoomEvent::Log { message, severity } => {
                ServerMessage::log(message.clone(), (*severity).into())
            }
        };
        Some(message)
    }
}
