use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::{format_system_time, phase::VisibleTurnPhase},
    state::{
        board::{Board, Tile, TileKind},
        room::{Player, Room, Slot, Trade},
    },
};

/// Public view of a seat. Session tokens and connection ids are never exposed.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct PlayerView {
    /// Seat number, 1 to 4.
    pub slot: Slot,
    /// Name chosen at join.
    pub display_name: String,
    /// Whether a session owns the seat.
    pub seated: bool,
    /// Board index of the player's token.
    pub position: usize,
    /// Current sanity.
    pub sanity: i32,
    /// Indices of owned properties.
    pub owned: Vec<usize>,
    /// Whether the player's transport is live.
    pub connected: bool,
    /// Out of the current round.
    pub eliminated: bool,
}

impl From<&Player> for PlayerView {
    fn from(player: &Player) -> Self {
        Self {
            slot: player.slot,
            display_name: player.display_name.clone(),
            seated: player.is_seated(),
            position: player.position,
            sanity: player.sanity,
            owned: player.owned.iter().copied().collect(),
            connected: player.connected,
            eliminated: player.eliminated,
        }
    }
}

/// Pending trade as shown to clients.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct TradeView {
    /// Slot making the offer.
    pub proposer: Slot,
    /// Slot asked to sell.
    pub owner: Slot,
    /// Tile being bought.
    pub tile_index: usize,
    /// Sanity offered.
    pub offer_amount: i32,
}

impl From<&Trade> for TradeView {
    fn from(trade: &Trade) -> Self {
        Self {
            proposer: trade.proposer,
            owner: trade.owner,
            tile_index: trade.tile,
            offer_amount: trade.offer_amount,
        }
    }
}

/// Complete room state broadcast after every change.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct RoomView {
    /// Room identifier.
    pub id: Uuid,
    /// Current turn phase.
    pub phase: VisibleTurnPhase,
    /// Slot whose turn it is.
    pub current_slot: Slot,
    /// All four seats in slot order.
    pub players: Vec<PlayerView>,
    /// Open trade, if any.
    pub trade: Option<TradeView>,
    /// Whether the round is over.
    pub ended: bool,
    /// RFC 3339 timestamp of the last mutation.
    pub last_activity: String,
}

impl From<&Room> for RoomView {
    fn from(room: &Room) -> Self {
        Self {
            id: room.id,
            phase: room.phase().into(),
            current_slot: room.current_slot,
            players: room.players.iter().map(PlayerView::from).collect(),
            trade: room.trade.as_ref().map(TradeView::from),
            ended: room.is_ended(),
            last_activity: format_system_time(room.last_activity),
        }
    }
}

/// Tile type as shown to clients.
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TileType {
    /// Passing it grants the start bonus.
    Start,
    /// Can be bought and charges rent.
    Property,
    /// Random sanity gain or loss.
    Event,
    /// Fixed sanity loss.
    Tax,
    /// Holding tile.
    Jail,
    /// Sends the player to jail.
    SendToJail,
    /// Nothing happens.
    FreeRest,
}

/// One board tile with its numeric parameters.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct TileView {
    /// Position on the board.
    pub index: usize,
    /// Display name.
    pub name: String,
    /// Tile type.
    #[serde(rename = "type")]
    pub tile_type: TileType,
    /// Purchase price of a property.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<i32>,
    /// Rent of a property.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rent: Option<i32>,
    /// Sanity lost on a tax tile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<i32>,
    /// Colour group of a property.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl TileView {
    fn new(index: usize, tile: &Tile) -> Self {
        let mut view = Self {
            index,
            name: tile.name.clone(),
            tile_type: TileType::FreeRest,
            price: None,
            rent: None,
            cost: None,
            group: None,
        };
        view.tile_type = match &tile.kind {
            TileKind::Start => TileType::Start,
            TileKind::Property { price, rent, group } => {
                view.price = Some(*price);
                view.rent = Some(*rent);
                view.group = Some(group.clone()).filter(|group| !group.is_empty());
                TileType::Property
            }
            TileKind::Event => TileType::Event,
            TileKind::Tax { cost } => {
                view.cost = Some(*cost);
                TileType::Tax
            }
            TileKind::Jail => TileType::Jail,
            TileKind::SendToJail => TileType::SendToJail,
            TileKind::FreeRest => TileType::FreeRest,
        };
        view
    }
}

/// Board layout sent with `init`.
pub fn board_view(board: &Board) -> Vec<TileView> {
    board
        .tiles()
        .iter()
        .enumerate()
        .map(|(index, tile)| TileView::new(index, tile))
        .collect()
}
