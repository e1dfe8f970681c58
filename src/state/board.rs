//! Static board model shared by every room playing the same rule-set.

use thiserror::Error;

/// Category of a tile together with the numeric parameters the engine reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileKind {
    /// Starting tile; passing it grants the start bonus.
    Start,
    /// Purchasable tile charging rent to visiting players.
    Property {
        /// Sanity required (strictly more) and paid on purchase.
        price: i32,
        /// Sanity moved from the visitor to the owner.
        rent: i32,
        /// Color group used by clients for grouping.
        group: String,
    },
    /// Randomized outcome tile.
    Event,
    /// Fixed sanity deduction.
    Tax {
        /// Sanity deducted when landing here.
        cost: i32,
    },
    /// Rest-only tile, also the destination of [`TileKind::SendToJail`].
    Jail,
    /// Teleports the visitor to the jail tile.
    SendToJail,
    /// Rest-only tile without effect.
    FreeRest,
}

/// Single board tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    /// Display name, only used by clients.
    pub name: String,
    /// Behaviour of the tile.
    pub kind: TileKind,
}

/// Reasons a board definition is refused at load time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    /// The board has no tiles at all.
    #[error("board must contain at least one tile")]
    Empty,
    /// Tile zero must be the start tile.
    #[error("tile 0 must be a start tile")]
    MissingStart,
    /// A send-to-jail tile exists but nowhere to send the player.
    #[error("board has a send-to-jail tile but no jail tile")]
    MissingJail,
    /// A numeric parameter is zero or negative.
    #[error("tile {index} (`{name}`) has a non-positive {field}")]
    NonPositive {
        /// Offending tile index.
        index: usize,
        /// Offending tile name.
        name: String,
        /// Offending parameter.
        field: &'static str,
    },
}

/// Ordered, fixed-length sequence of tiles. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    tiles: Vec<Tile>,
    jail_index: usize,
}

impl Board {
    /// Validate the tiles and build a board.
    pub fn new(tiles: Vec<Tile>) -> Result<Self, BoardError> {
        let first = tiles.first().ok_or(BoardError::Empty)?;
        if first.kind != TileKind::Start {
            return Err(BoardError::MissingStart);
        }

        for (index, tile) in tiles.iter().enumerate() {
            let invalid = match &tile.kind {
                TileKind::Property { price, .. } if *price <= 0 => Some("price"),
                TileKind::Property { rent, .. } if *rent <= 0 => Some("rent"),
                TileKind::Tax { cost } if *cost <= 0 => Some("cost"),
                _ => None,
            };
            if let Some(field) = invalid {
                return Err(BoardError::NonPositive {
                    index,
                    name: tile.name.clone(),
                    field,
                });
            }
        }

        let jail = tiles.iter().position(|tile| tile.kind == TileKind::Jail);
        let needs_jail = tiles.iter().any(|tile| tile.kind == TileKind::SendToJail);
        let jail_index = match jail {
            Some(index) => index,
            None if needs_jail => return Err(BoardError::MissingJail),
            None => 0,
        };

        Ok(Self { tiles, jail_index })
    }

    /// Number of tiles on the board.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Always false for a validated board; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Tile at `index`, if in range.
    pub fn tile(&self, index: usize) -> Option<&Tile> {
        self.tiles.get(index)
    }

    /// All tiles in board order.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Destination of send-to-jail tiles.
    pub fn jail_index(&self) -> usize {
        self.jail_index
    }
}

impl Default for Board {
    /// The classic 28-tile layout.
    fn default() -> Self {
        let tiles = vec![
            special("START", TileKind::Start),
            property("Cellar", 15, 4, "brown"),
            special("Fate", TileKind::Event),
            property("Attic", 18, 5, "brown"),
            special("Blood Offering", TileKind::Tax { cost: 10 }),
            property("Ruin", 22, 6, "yellow"),
            special("Whispering Hall", TileKind::Event),
            special("FORSAKEN", TileKind::Jail),
            property("Moor", 25, 8, "green"),
            special("Fate", TileKind::Event),
            property("Forest", 28, 10, "green"),
            property("Crypt", 32, 12, "blue"),
            special("Will-o'-Wisps", TileKind::Event),
            property("Chancery", 35, 14, "blue"),
            special("STILL POINT", TileKind::FreeRest),
            property("Laboratory", 40, 16, "pink"),
            special("Fate", TileKind::Event),
            property("Clinic", 45, 18, "pink"),
            special("Tribute", TileKind::Tax { cost: 15 }),
            property("Cathedral", 50, 20, "grey"),
            special("Voices", TileKind::Event),
            special("HELLGATE", TileKind::SendToJail),
            property("Abyss", 55, 22, "dark"),
            special("Fate", TileKind::Event),
            property("Void", 60, 25, "dark"),
            property("Citadel", 70, 30, "final"),
            special("Murmurs", TileKind::Event),
            property("TERMINUS", 80, 40, "final"),
        ];

        // The built-in layout is known to be valid.
        Self {
            tiles,
            jail_index: 7,
        }
    }
}

fn special(name: &str, kind: TileKind) -> Tile {
    Tile {
        name: name.to_string(),
        kind,
    }
}

fn property(name: &str, price: i32, rent: i32, group: &str) -> Tile {
    Tile {
        name: name.to_string(),
        kind: TileKind::Property {
            price,
            rent,
            group: group.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_board_passes_validation() {
        let board = Board::default();
        let rebuilt = Board::new(board.tiles().to_vec()).unwrap();
        assert_eq!(rebuilt, board);
        assert_eq!(board.len(), 28);
        assert_eq!(board.jail_index(), 7);
    }

    #[test]
    fn rejects_board_without_start() {
        let err = Board::new(vec![special("Rest", TileKind::FreeRest)]).unwrap_err();
        assert_eq!(err, BoardError::MissingStart);
        assert_eq!(Board::new(Vec::new()).unwrap_err(), BoardError::Empty);
    }

    #[test]
    fn rejects_send_to_jail_without_jail() {
        let err = Board::new(vec![
            special("START", TileKind::Start),
            special("Gate", TileKind::SendToJail),
        ])
        .unwrap_err();
        assert_eq!(err, BoardError::MissingJail);
    }

    #[test]
    fn rejects_free_property() {
        let err = Board::new(vec![
            special("START", TileKind::Start),
            property("Shed", 0, 2, "brown"),
        ])
        .unwrap_err();
        assert!(matches!(err, BoardError::NonPositive { index: 1, field: "price", .. }));
    }
}
