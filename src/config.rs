//! Application-level configuration loading: game rules, timings, board and storage.

use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::{
    board::{Board, Tile, TileKind},
    engine::Rules,
    room::Continuation,
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SANITY_BOARD_CONFIG_PATH";
/// Default directory of the file room store.
const DEFAULT_DATA_DIR: &str = "data/rooms";
/// Interval between two restart countdown broadcasts.
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Durations driving scheduled work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// Delay between a roll and its resolution (dice animation).
    pub roll_resolution: Duration,
    /// Delay during which an event outcome is displayed.
    pub event_display: Duration,
    /// Interval of the persistence flusher.
    pub flush_interval: Duration,
    /// Interval of the idle-room sweeper.
    pub sweep_interval: Duration,
    /// Idle time after which a room is evicted.
    pub room_retention: Duration,
    /// Time a new socket has to send its join command.
    pub join_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            roll_resolution: Duration::from_millis(1_500),
            event_display: Duration::from_millis(3_500),
            flush_interval: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(60),
            room_retention: Duration::from_secs(6 * 60 * 60),
            join_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    rules: Rules,
    timings: Timings,
    board: Arc<Board>,
    data_dir: PathBuf,
    max_rooms: Option<usize>,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        Self::load_from(&resolve_config_path())
    }

    /// Load the configuration from `path`, falling back to baked-in defaults.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        tiles = app_config.board.len(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Game rules.
    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Scheduling durations.
    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Board shared by every room.
    pub fn board(&self) -> Arc<Board> {
        Arc::clone(&self.board)
    }

    /// Directory used by the file room store.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Upper bound on simultaneously open rooms, if any.
    pub fn max_rooms(&self) -> Option<usize> {
        self.max_rooms
    }

    /// Delay before `continuation` may be applied.
    pub fn delay_for(&self, continuation: Continuation) -> Duration {
        match continuation {
            Continuation::ResolveRoll => self.timings.roll_resolution,
            Continuation::FinishEvent => self.timings.event_display,
            Continuation::CountdownTick { .. } => COUNTDOWN_TICK,
        }
    }

    /// Replace the timings, mostly useful for tests.
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Replace the rules, mostly useful for tests.
    pub fn with_rules(mut self, rules: Rules) -> Self {
        self.rules = rules;
        self
    }

    /// Replace the storage directory.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Replace the room limit.
    pub fn with_max_rooms(mut self, max_rooms: Option<usize>) -> Self {
        self.max_rooms = max_rooms;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rules: Rules::default(),
            timings: Timings::default(),
            board: Arc::new(Board::default()),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            max_rooms: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    rules: RawRules,
    timings: RawTimings,
    board: Option<Vec<RawTile>>,
    data_dir: Option<PathBuf>,
    max_rooms: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawRules {
    starting_sanity: i32,
    max_sanity: i32,
    start_bonus: i32,
    event_magnitude: i32,
    restart_countdown_secs: u32,
    trade_requires_turn: bool,
}

impl Default for RawRules {
    fn default() -> Self {
        let rules = Rules::default();
        Self {
            starting_sanity: rules.starting_sanity,
            max_sanity: rules.max_sanity,
            start_bonus: rules.start_bonus,
            event_magnitude: rules.event_magnitude,
            restart_countdown_secs: rules.restart_countdown_secs,
            trade_requires_turn: rules.trade_requires_turn,
        }
    }
}

impl From<RawRules> for Rules {
    fn from(value: RawRules) -> Self {
        Self {
            starting_sanity: value.starting_sanity,
            max_sanity: value.max_sanity,
            start_bonus: value.start_bonus,
            event_magnitude: value.event_magnitude,
            restart_countdown_secs: value.restart_countdown_secs,
            trade_requires_turn: value.trade_requires_turn,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawTimings {
    roll_resolution_ms: u64,
    event_display_ms: u64,
    flush_interval_secs: u64,
    sweep_interval_secs: u64,
    room_retention_secs: u64,
    join_timeout_secs: u64,
}

impl Default for RawTimings {
    fn default() -> Self {
        let timings = Timings::default();
        Self {
            roll_resolution_ms: timings.roll_resolution.as_millis() as u64,
            event_display_ms: timings.event_display.as_millis() as u64,
            flush_interval_secs: timings.flush_interval.as_secs(),
            sweep_interval_secs: timings.sweep_interval.as_secs(),
            room_retention_secs: timings.room_retention.as_secs(),
            join_timeout_secs: timings.join_timeout.as_secs(),
        }
    }
}

impl From<RawTimings> for Timings {
    fn from(value: RawTimings) -> Self {
        Self {
            roll_resolution: Duration::from_millis(value.roll_resolution_ms),
            event_display: Duration::from_millis(value.event_display_ms),
            flush_interval: Duration::from_secs(value.flush_interval_secs.max(1)),
            sweep_interval: Duration::from_secs(value.sweep_interval_secs.max(1)),
            room_retention: Duration::from_secs(value.room_retention_secs),
            join_timeout: Duration::from_secs(value.join_timeout_secs.max(1)),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of a single board tile.
struct RawTile {
    name: String,
    #[serde(flatten)]
    kind: RawTileKind,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawTileKind {
    Start,
    Property {
        price: i32,
        rent: i32,
        #[serde(default)]
        group: String,
    },
    Event,
    Tax {
        cost: i32,
    },
    Jail,
    SendToJail,
    FreeRest,
}

impl From<RawTile> for Tile {
    fn from(value: RawTile) -> Self {
        let kind = match value.kind {
            RawTileKind::Start => TileKind::Start,
            RawTileKind::Property { price, rent, group } => TileKind::Property { price, rent, group },
            RawTileKind::Event => TileKind::Event,
            RawTileKind::Tax { cost } => TileKind::Tax { cost },
            RawTileKind::Jail => TileKind::Jail,
            RawTileKind::SendToJail => TileKind::SendToJail,
            RawTileKind::FreeRest => TileKind::FreeRest,
        };
        Self {
            name: value.name,
            kind,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let board = match value.board {
            Some(tiles) => {
                match Board::new(tiles.into_iter().map(Into::into).collect()) {
                    Ok(board) => board,
                    Err(err) => {
                        warn!(error = %err, "invalid board in config; using the built-in board");
                        Board::default()
                    }
                }
            }
            None => Board::default(),
        };

        Self {
            rules: value.rules.into(),
            timings: value.timings.into(),
            board: Arc::new(board),
            data_dir: value
                .data_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            max_rooms: value.max_rooms.filter(|max| *max > 0),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
