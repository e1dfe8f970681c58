//! Turn engine: pure transition logic applied to a [`Room`] under its lock.
//!
//! Nothing here performs I/O. Every operation returns an [`Outcome`] listing
//! what should be broadcast and which continuation (if any) must be scheduled;
//! the service layer interprets it.

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::state::{
    board::TileKind,
    room::{
        ConnectionId, Continuation, MAX_PLAYERS, PendingContinuation, Player, Room, Slot,
        Trade,
    },
    state_machine::{InvalidTransition, TurnEvent, TurnPhase},
    trade,
};

/// Numeric rules of the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rules {
    /// Sanity every player starts a round with.
    pub starting_sanity: i32,
    /// Display cap applied to the start bonus and event gains.
    pub max_sanity: i32,
    /// Sanity granted when passing the start tile.
    pub start_bonus: i32,
    /// Magnitude of event gains and losses.
    pub event_magnitude: i32,
    /// Length of the countdown between a win and the next round.
    pub restart_countdown_secs: u32,
    /// Only the player whose turn it is may propose trades.
    pub trade_requires_turn: bool,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            starting_sanity: 100,
            max_sanity: 100,
            start_bonus: 20,
            event_magnitude: 10,
            restart_countdown_secs: 10,
            trade_requires_turn: true,
        }
    }
}

/// Direction of an event outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// The player regains sanity.
    Gain,
    /// The player loses sanity.
    Loss,
}

/// Source of the game's pseudorandom draws.
pub trait Randomness: Send {
    /// Uniform draw in `1..=6`.
    fn roll_die(&mut self) -> u8;
    /// Uniform choice between gain and loss.
    fn event_polarity(&mut self) -> Polarity;
}

/// [`Randomness`] backed by the thread-local generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandomness;

impl Randomness for ThreadRandomness {
    fn roll_die(&mut self) -> u8 {
        rand::rng().random_range(1..=6)
    }

    fn event_polarity(&mut self) -> Polarity {
        if rand::rng().random_bool(0.5) {
            Polarity::Gain
        } else {
            Polarity::Loss
        }
    }
}

/// Severity attached to game log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Neutral information.
    Info,
    /// Something good happened to a player.
    Success,
    /// A command was refused or something failed.
    Warning,
    /// A player lost sanity or was eliminated.
    Danger,
}

/// Things that happened while applying an operation, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// Dice value drawn for presentation.
    DiceRolled {
        /// Roller.
        slot: Slot,
        /// Value in `1..=6`.
        roll: u8,
    },
    /// Randomized event outcome to display.
    EventOutcome {
        /// Affected player.
        slot: Slot,
        /// Gain or loss.
        polarity: Polarity,
        /// Sanity moved.
        amount: i32,
    },
    /// A trade offer addressed to its owner only.
    TradeRequested(Trade),
    /// The round is over.
    GameOver {
        /// Winning seat.
        winner: Slot,
        /// Winner's display name.
        winner_name: String,
    },
    /// Restart countdown progress.
    Countdown {
        /// Seconds until the next round.
        seconds_left: u32,
    },
    /// Human readable log line.
    Log {
        /// Message text.
        message: String,
        /// Presentation hint.
        severity: Severity,
    },
}

/// Result of an applied operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Events to deliver, in order.
    pub events: Vec<RoomEvent>,
    /// Whether the room state changed and must be re-broadcast and persisted.
    pub state_changed: bool,
    /// Continuation to schedule, if any.
    pub schedule: Option<PendingContinuation>,
}

impl Outcome {
    pub(crate) fn changed() -> Self {
        Self {
            state_changed: true,
            ..Self::default()
        }
    }

    pub(crate) fn log(&mut self, message: impl Into<String>, severity: Severity) {
        self.events.push(RoomEvent::Log {
            message: message.into(),
            severity,
        });
    }
}

/// Why a command was ignored. Rejections never mutate the room.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The slot does not exist or is not seated.
    #[error("slot {0} is not seated in this room")]
    UnknownSlot(Slot),
    /// The command must come from the current player.
    #[error("it is not slot {slot}'s turn")]
    NotYourTurn {
        /// Slot that sent the command.
        slot: Slot,
    },
    /// The command is not accepted in the current phase.
    #[error("command not accepted while {phase:?}")]
    WrongPhase {
        /// Phase at the time of the command.
        phase: TurnPhase,
    },
    /// The player cannot pay.
    #[error("insufficient sanity (required {required}, available {available})")]
    InsufficientSanity {
        /// Amount needed.
        required: i32,
        /// Amount held.
        available: i32,
    },
    /// The tile cannot be bought or traded.
    #[error("tile {0} is not available")]
    TileUnavailable(usize),
    /// Another trade is already open.
    #[error("a trade is already pending")]
    TradePending,
    /// There is no trade to answer.
    #[error("no trade is pending")]
    NoTrade,
    /// Only the owner named in the trade may answer.
    #[error("slot {slot} is not the target of the pending trade")]
    NotTradeTarget {
        /// Slot that tried to answer.
        slot: Slot,
    },
    /// The offer itself is malformed.
    #[error("invalid trade offer: {0}")]
    InvalidOffer(&'static str),
    /// The player is out of the round.
    #[error("slot {0} is eliminated")]
    Eliminated(Slot),
    /// The other party of a trade is not connected.
    #[error("slot {0} is not connected")]
    Absent(Slot),
    /// The connection no longer owns the slot.
    #[error("connection superseded")]
    Superseded,
    /// A continuation fired after the room moved on.
    #[error("continuation is stale")]
    Stale,
}

impl From<InvalidTransition> for Rejection {
    fn from(err: InvalidTransition) -> Self {
        Rejection::WrongPhase { phase: err.from }
    }
}

/// Add `amount` to `sanity` without exceeding `cap`, never lowering a value already above it.
pub fn capped_gain(sanity: i32, amount: i32, cap: i32) -> i32 {
    if sanity >= cap {
        sanity
    } else {
        (sanity + amount).min(cap)
    }
}

/// Leave `Waiting` once at least two connected eligible players are seated.
pub fn start_if_ready(room: &mut Room) -> Outcome {
    if room.phase() != &TurnPhase::Waiting || room.active_count() < 2 {
        return Outcome::default();
    }

    let Some(first) = room
        .players
        .iter()
        .find(|player| player.can_take_turn())
        .map(|player| player.slot)
    else {
        return Outcome::default();
    };

    let mut out = Outcome::changed();
    if room.machine.apply(TurnEvent::Start).is_ok() {
        room.current_slot = first;
        out.log("The madness begins.", Severity::Info);
    }
    out
}

/// Bind a fresh session to `slot` and reset its stats.
pub fn seat(
    room: &mut Room,
    rules: &Rules,
    slot: Slot,
    session_token: String,
    display_name: String,
    connection: ConnectionId,
) -> Result<Outcome, Rejection> {
    let player = room.player_mut(slot).ok_or(Rejection::UnknownSlot(slot))?;
    if player.is_seated() {
        return Err(Rejection::UnknownSlot(slot));
    }

    player.session_token = Some(session_token);
    player.display_name = display_name;
    player.connection = Some(connection);
    player.connected = true;
    player.reset_stats(rules.starting_sanity);

    let mut out = Outcome::changed();
    out.log(
        format!("{} joined as P{slot}.", player.display_name),
        Severity::Info,
    );
    let started = start_if_ready(room);
    out.events.extend(started.events);
    room.touch();
    Ok(out)
}

/// Reattach a returning session's new connection to its seat.
pub fn reattach(
    room: &mut Room,
    slot: Slot,
    connection: ConnectionId,
) -> Result<Outcome, Rejection> {
    let player = room.player_mut(slot).ok_or(Rejection::UnknownSlot(slot))?;
    if !player.is_seated() {
        return Err(Rejection::UnknownSlot(slot));
    }

    player.connection = Some(connection);
    player.connected = true;

    let mut out = Outcome::changed();
    out.log(
        format!("{} is back (P{slot}).", player.display_name),
        Severity::Info,
    );

    let started = start_if_ready(room);
    out.events.extend(started.events);

    let current_absent = room
        .player(room.current_slot)
        .is_none_or(|player| !player.can_take_turn());
    if room.phase() == &TurnPhase::Roll && current_absent {
        end_turn(room, &mut out);
    }

    room.touch();
    Ok(out)
}

/// Mark the seat owning `connection` as disconnected.
///
/// The session binding is kept. A pending continuation is not cancelled, but
/// an open trade involving the player is, and a current player idling in
/// `Roll` or `Decision` forfeits the turn.
pub fn disconnect(room: &mut Room, connection: ConnectionId) -> Result<Outcome, Rejection> {
    let slot = room
        .slot_of_connection(connection)
        .ok_or(Rejection::Superseded)?;
    let Some(player) = room.player_mut(slot) else {
        return Err(Rejection::UnknownSlot(slot));
    };
    player.connection = None;
    player.connected = false;

    let mut out = Outcome::changed();
    out.log(
        format!("P{slot} lost the connection."),
        Severity::Danger,
    );

    let in_trade = room
        .trade
        .as_ref()
        .is_some_and(|trade| trade.proposer == slot || trade.owner == slot);
    if in_trade {
        trade::cancel(room, &mut out);
    }

    let idle_turn = matches!(room.phase(), TurnPhase::Roll | TurnPhase::Decision { .. });
    if slot == room.current_slot && idle_turn {
        end_turn(room, &mut out);
    }

    room.touch();
    Ok(out)
}

/// Roll the dice for the current player.
pub fn roll(
    room: &mut Room,
    slot: Slot,
    rng: &mut dyn Randomness,
) -> Result<Outcome, Rejection> {
    if room.phase() != &TurnPhase::Roll {
        return Err(Rejection::WrongPhase {
            phase: room.phase().clone(),
        });
    }
    ensure_in_round(room, slot)?;
    if slot != room.current_slot {
        return Err(Rejection::NotYourTurn { slot });
    }

    let value = rng.roll_die().clamp(1, 6);
    room.machine.apply(TurnEvent::DiceThrown)?;
    room.last_roll = Some(value);

    let mut out = Outcome::changed();
    out.events.push(RoomEvent::DiceRolled { slot, roll: value });
    out.log(format!("P{slot} rolls a {value}."), Severity::Info);
    schedule(room, &mut out, Continuation::ResolveRoll);
    room.touch();
    Ok(out)
}

/// Answer the purchase offer of the `Decision` phase.
pub fn decide(room: &mut Room, slot: Slot, buy: bool) -> Result<Outcome, Rejection> {
    let TurnPhase::Decision { tile, price } = room.phase().clone() else {
        return Err(Rejection::WrongPhase {
            phase: room.phase().clone(),
        });
    };
    ensure_in_round(room, slot)?;
    if slot != room.current_slot {
        return Err(Rejection::NotYourTurn { slot });
    }

    let mut out = Outcome::changed();
    if buy {
        if room.owner_of(tile).is_some() {
            return Err(Rejection::TileUnavailable(tile));
        }
        let player = room.player_mut(slot).ok_or(Rejection::UnknownSlot(slot))?;
        if player.sanity <= price {
            return Err(Rejection::InsufficientSanity {
                required: price + 1,
                available: player.sanity,
            });
        }
        player.sanity -= price;
        player.owned.insert(tile);
        let name = tile_name(room, tile);
        out.log(format!("P{slot} buys {name}."), Severity::Success);
    } else {
        out.log(format!("P{slot} passes."), Severity::Info);
    }

    end_turn(room, &mut out);
    room.touch();
    Ok(out)
}

/// Apply a scheduled continuation if it is still the one the room expects.
pub fn resume(
    room: &mut Room,
    rules: &Rules,
    pending: PendingContinuation,
    rng: &mut dyn Randomness,
) -> Result<Outcome, Rejection> {
    if room.pending != Some(pending) || room.machine.version() != pending.version {
        return Err(Rejection::Stale);
    }
    room.pending = None;

    let out = match pending.continuation {
        Continuation::ResolveRoll => resolve_roll(room, rules, rng),
        Continuation::FinishEvent => finish_event(room, rules),
        Continuation::CountdownTick { seconds_left } => countdown_tick(room, rules, seconds_left),
    };
    room.touch();
    Ok(out)
}

fn resolve_roll(room: &mut Room, rules: &Rules, rng: &mut dyn Randomness) -> Outcome {
    let mut out = Outcome::changed();
    let slot = room.current_slot;
    let Some(roll) = room.last_roll.take() else {
        warn!(room_id = %room.id, slot, "roll resolution without a recorded roll");
        end_turn(room, &mut out);
        return out;
    };

    let board_len = room.board.len();
    let Some(player) = room.player_mut(slot) else {
        end_turn(room, &mut out);
        return out;
    };

    let old = player.position;
    let new = (old + roll as usize) % board_len;
    player.position = new;
    if new < old {
        player.sanity = capped_gain(player.sanity, rules.start_bonus, rules.max_sanity);
        out.log(
            format!("P{slot} passes START (+{} sanity).", rules.start_bonus),
            Severity::Success,
        );
    }
    let mover_sanity = player.sanity;

    let Some(tile) = room.board.tile(new).cloned() else {
        end_turn(room, &mut out);
        return out;
    };

    match tile.kind {
        TileKind::Property { price, rent, .. } => match room.owner_of(new) {
            None if mover_sanity > price => {
                if room
                    .machine
                    .apply(TurnEvent::PurchaseOffered { tile: new, price })
                    .is_err()
                {
                    end_turn(room, &mut out);
                }
            }
            None => {
                out.log(
                    format!("P{slot} cannot afford {}.", tile.name),
                    Severity::Info,
                );
                end_turn(room, &mut out);
            }
            Some(owner) if owner == slot => {
                out.log(
                    format!("P{slot} rests in their own {}.", tile.name),
                    Severity::Info,
                );
                end_turn(room, &mut out);
            }
            Some(owner) => {
                if let Some(mover) = room.player_mut(slot) {
                    mover.sanity -= rent;
                }
                if let Some(landlord) = room.player_mut(owner) {
                    landlord.sanity += rent;
                }
                out.log(
                    format!("P{slot} pays {rent} rent to P{owner}."),
                    Severity::Danger,
                );
                eliminate_or_end_turn(room, rules, slot, &mut out);
            }
        },
        TileKind::Tax { cost } => {
            if let Some(mover) = room.player_mut(slot) {
                mover.sanity -= cost;
            }
            out.log(
                format!("{}: -{cost} sanity for P{slot}.", tile.name),
                Severity::Danger,
            );
            eliminate_or_end_turn(room, rules, slot, &mut out);
        }
        TileKind::SendToJail => {
            let jail = room.board.jail_index();
            if let Some(mover) = room.player_mut(slot) {
                mover.position = jail;
            }
            out.log(format!("P{slot} was banished!"), Severity::Danger);
            end_turn(room, &mut out);
        }
        TileKind::Event => {
            let polarity = rng.event_polarity();
            let amount = rules.event_magnitude;
            if let Some(mover) = room.player_mut(slot) {
                match polarity {
                    Polarity::Gain => {
                        mover.sanity = capped_gain(mover.sanity, amount, rules.max_sanity)
                    }
                    Polarity::Loss => mover.sanity -= amount,
                }
            }
            out.events.push(RoomEvent::EventOutcome {
                slot,
                polarity,
                amount,
            });
            schedule(room, &mut out, Continuation::FinishEvent);
        }
        TileKind::Start | TileKind::Jail | TileKind::FreeRest => end_turn(room, &mut out),
    }

    out
}

fn finish_event(room: &mut Room, rules: &Rules) -> Outcome {
    let mut out = Outcome::changed();
    let slot = room.current_slot;
    eliminate_or_end_turn(room, rules, slot, &mut out);
    out
}

fn countdown_tick(room: &mut Room, rules: &Rules, seconds_left: u32) -> Outcome {
    let mut out = Outcome::default();
    out.events.push(RoomEvent::Countdown { seconds_left });
    if seconds_left == 0 {
        reset_round(room, rules, &mut out);
    } else {
        schedule(
            room,
            &mut out,
            Continuation::CountdownTick {
                seconds_left: seconds_left - 1,
            },
        );
    }
    out
}

fn reset_round(room: &mut Room, rules: &Rules, out: &mut Outcome) {
    for player in room.players.iter_mut().filter(|player| player.is_seated()) {
        player.reset_stats(rules.starting_sanity);
    }
    room.trade = None;
    room.last_roll = None;

    let playable = room.eligible_count() >= 2;
    if let Err(err) = room.machine.apply(TurnEvent::RoundReset { playable }) {
        warn!(room_id = %room.id, error = %err, "round reset refused");
        return;
    }

    let first = room
        .players
        .iter()
        .find(|player| player.can_take_turn())
        .or_else(|| room.players.iter().find(|player| player.is_eligible()))
        .map(|player| player.slot);
    if let Some(slot) = first {
        room.current_slot = slot;
    }

    out.state_changed = true;
    out.log("A new round begins.", Severity::Info);
}

fn eliminate_or_end_turn(room: &mut Room, rules: &Rules, slot: Slot, out: &mut Outcome) {
    let broke = room.player(slot).is_some_and(|player| player.sanity <= 0);
    if broke {
        eliminate(room, rules, slot, out);
    } else {
        end_turn(room, out);
    }
}

/// Knock `slot` out of the round, then either declare a winner or end the turn.
pub(crate) fn eliminate(room: &mut Room, rules: &Rules, slot: Slot, out: &mut Outcome) {
    let Some(player) = room.player_mut(slot) else {
        return;
    };
    player.sanity = 0;
    player.eliminated = true;
    player.owned.clear();
    out.state_changed = true;
    out.log(format!("P{slot} lost their mind!"), Severity::Danger);

    let remaining: Vec<Slot> = room
        .players
        .iter()
        .filter(|player| player.is_eligible())
        .map(|player| player.slot)
        .collect();

    if let [winner] = remaining[..] {
        match room.machine.apply(TurnEvent::GameWon { winner }) {
            Ok(_) => {
                let winner_name = room
                    .player(winner)
                    .map(|player| player.display_name.clone())
                    .unwrap_or_default();
                room.trade = None;
                room.last_roll = None;
                out.events.push(RoomEvent::GameOver {
                    winner,
                    winner_name,
                });
                out.events.push(RoomEvent::Countdown {
                    seconds_left: rules.restart_countdown_secs,
                });
                schedule(
                    room,
                    out,
                    Continuation::CountdownTick {
                        seconds_left: rules.restart_countdown_secs.saturating_sub(1),
                    },
                );
            }
            Err(err) => warn!(room_id = %room.id, error = %err, "win detection refused"),
        }
    } else if slot == room.current_slot {
        end_turn(room, out);
    }
}

/// Hand the turn to the next connected, eligible seat and return to `Roll`.
pub(crate) fn end_turn(room: &mut Room, out: &mut Outcome) {
    if room.is_ended() {
        return;
    }

    let start = room.current_slot.clamp(1, MAX_PLAYERS as Slot) as usize - 1;
    let seat_after = |ready: fn(&Player) -> bool| {
        (1..=MAX_PLAYERS)
            .map(|step| ((start + step) % MAX_PLAYERS) as Slot + 1)
            .find(|slot| room.player(*slot).is_some_and(ready))
    };
    // An eliminated seat never keeps the turn, even if only absent players remain.
    let current_out = room
        .player(room.current_slot)
        .is_none_or(|player| !player.is_eligible());
    let next = seat_after(Player::can_take_turn)
        .or_else(|| current_out.then(|| seat_after(Player::is_eligible)).flatten());

    match room.machine.apply(TurnEvent::TurnEnded) {
        Ok(_) => {
            if let Some(slot) = next {
                room.current_slot = slot;
            } else {
                debug!(room_id = %room.id, "no connected player can take the next turn");
            }
            out.state_changed = true;
        }
        Err(err) => warn!(room_id = %room.id, error = %err, "end of turn refused"),
    }
}

/// Reject commands from seats that are unbound or out of the round.
fn ensure_in_round(room: &Room, slot: Slot) -> Result<(), Rejection> {
    match room.player(slot) {
        Some(player) if player.eliminated => Err(Rejection::Eliminated(slot)),
        Some(player) if player.is_seated() => Ok(()),
        _ => Err(Rejection::UnknownSlot(slot)),
    }
}

fn schedule(room: &mut Room, out: &mut Outcome, continuation: Continuation) {
    let pending = PendingContinuation {
        continuation,
        version: room.machine.version(),
    };
    room.pending = Some(pending);
    out.schedule = Some(pending);
}

fn tile_name(room: &Room, tile: usize) -> String {
    room.board
        .tile(tile)
        .map(|tile| tile.name.clone())
        .unwrap_or_else(|| format!("tile {tile}"))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{collections::VecDeque, sync::Arc};

    use super::*;
    use crate::state::board::Board;

    /// Deterministic draws for tests.
    #[derive(Default)]
    pub(crate) struct Scripted {
        pub dice: VecDeque<u8>,
        pub events: VecDeque<Polarity>,
    }

    impl Scripted {
        pub(crate) fn dice(values: &[u8]) -> Self {
            Self {
                dice: values.iter().copied().collect(),
                events: VecDeque::new(),
            }
        }
    }

    impl Randomness for Scripted {
        fn roll_die(&mut self) -> u8 {
            self.dice.pop_front().unwrap_or(1)
        }

        fn event_polarity(&mut self) -> Polarity {
            self.events.pop_front().unwrap_or(Polarity::Gain)
        }
    }

    pub(crate) fn room_with(players: usize) -> Room {
        let rules = Rules::default();
        let mut room = Room::new(Arc::new(Board::default()), rules.starting_sanity);
        for slot in 1..=players as Slot {
            seat(
                &mut room,
                &rules,
                slot,
                format!("token-{slot}"),
                format!("Player {slot}"),
                ConnectionId::new_v4(),
            )
            .unwrap();
        }
        room
    }

    fn roll_and_resolve(room: &mut Room, rng: &mut Scripted) -> Outcome {
        let slot = room.current_slot;
        let rolled = roll(room, slot, rng).unwrap();
        let pending = rolled.schedule.unwrap();
        resume(room, &Rules::default(), pending, rng).unwrap()
    }

    fn assert_invariants(room: &Room) {
        let mut seen = std::collections::HashSet::new();
        for player in &room.players {
            for tile in &player.owned {
                assert!(seen.insert(*tile), "tile {tile} owned twice");
            }
            if player.eliminated {
                assert!(player.owned.is_empty());
            }
        }
    }

    #[test]
    fn two_joins_start_the_room_with_slot_one() {
        let room = room_with(2);
        assert_eq!(room.phase(), &TurnPhase::Roll);
        assert_eq!(room.current_slot, 1);
    }

    #[test]
    fn single_join_keeps_waiting() {
        let room = room_with(1);
        assert_eq!(room.phase(), &TurnPhase::Waiting);
    }

    #[test]
    fn out_of_turn_or_wrong_phase_roll_is_a_noop() {
        let mut room = room_with(2);
        let before = format!("{room:?}");

        let err = roll(&mut room, 2, &mut Scripted::dice(&[3])).unwrap_err();
        assert_eq!(err, Rejection::NotYourTurn { slot: 2 });
        assert_eq!(format!("{room:?}"), before);

        roll(&mut room, 1, &mut Scripted::dice(&[3])).unwrap();
        let snapshot = format!("{room:?}");
        let err = roll(&mut room, 1, &mut Scripted::dice(&[3])).unwrap_err();
        assert!(matches!(err, Rejection::WrongPhase { phase: TurnPhase::Animating }));
        assert_eq!(format!("{room:?}"), snapshot);
    }

    #[test]
    fn passing_start_grants_the_bonus() {
        let mut room = room_with(2);
        {
            let player = room.player_mut(1).unwrap();
            player.position = 26;
            player.sanity = 50;
        }
        // Wraps onto tile 1, a plain property, so only the bonus applies.
        roll_and_resolve(&mut room, &mut Scripted::dice(&[3]));

        let player = room.player(1).unwrap();
        assert_eq!(player.position, 1);
        assert_eq!(player.sanity, 70);
        assert_eq!(room.phase(), &TurnPhase::Decision { tile: 1, price: 15 });
    }

    #[test]
    fn start_bonus_is_capped() {
        let mut room = room_with(2);
        {
            let player = room.player_mut(1).unwrap();
            player.position = 26;
            player.sanity = 90;
        }
        roll_and_resolve(&mut room, &mut Scripted::dice(&[3]));
        assert_eq!(room.player(1).unwrap().sanity, 100);
    }

    #[test]
    fn start_bonus_does_not_lower_rent_windfall() {
        assert_eq!(capped_gain(130, 20, 100), 130);
        assert_eq!(capped_gain(95, 20, 100), 100);
        assert_eq!(capped_gain(40, 20, 100), 60);
    }

    #[test]
    fn affordable_property_offers_decision_and_buy_ends_turn() {
        let mut room = room_with(2);
        roll_and_resolve(&mut room, &mut Scripted::dice(&[1]));
        assert_eq!(room.phase(), &TurnPhase::Decision { tile: 1, price: 15 });

        let err = decide(&mut room, 2, true).unwrap_err();
        assert_eq!(err, Rejection::NotYourTurn { slot: 2 });

        decide(&mut room, 1, true).unwrap();
        let buyer = room.player(1).unwrap();
        assert_eq!(buyer.sanity, 85);
        assert!(buyer.owned.contains(&1));
        assert_eq!(room.phase(), &TurnPhase::Roll);
        assert_eq!(room.current_slot, 2);
        assert_invariants(&room);
    }

    #[test]
    fn purchase_requires_strictly_more_sanity_than_price() {
        let mut room = room_with(2);
        room.player_mut(1).unwrap().sanity = 15;
        roll_and_resolve(&mut room, &mut Scripted::dice(&[1]));
        // 15 is not strictly greater than the price of 15.
        assert_eq!(room.phase(), &TurnPhase::Roll);
        assert_eq!(room.current_slot, 2);
        assert!(room.player(1).unwrap().owned.is_empty());
    }

    #[test]
    fn rent_moves_sanity_and_can_exceed_cap() {
        let mut room = room_with(2);
        room.player_mut(2).unwrap().owned.insert(19);
        room.player_mut(1).unwrap().position = 17;
        roll_and_resolve(&mut room, &mut Scripted::dice(&[2]));

        assert_eq!(room.player(1).unwrap().sanity, 80);
        assert_eq!(room.player(2).unwrap().sanity, 120);
        assert_eq!(room.current_slot, 2);
    }

    #[test]
    fn rent_to_zero_eliminates_and_declares_winner() {
        let mut room = room_with(2);
        room.player_mut(2).unwrap().owned.insert(19);
        {
            let mover = room.player_mut(1).unwrap();
            mover.position = 17;
            mover.sanity = 20;
        }
        let out = roll_and_resolve(&mut room, &mut Scripted::dice(&[2]));

        let mover = room.player(1).unwrap();
        assert!(mover.eliminated);
        assert_eq!(mover.sanity, 0);
        assert!(mover.owned.is_empty());
        assert_eq!(room.phase(), &TurnPhase::Ended { winner: 2 });
        assert!(out.events.iter().any(|event| matches!(
            event,
            RoomEvent::GameOver { winner: 2, .. }
        )));
        assert_eq!(
            out.schedule.map(|pending| pending.continuation),
            Some(Continuation::CountdownTick { seconds_left: 9 })
        );
        assert_invariants(&room);
    }

    #[test]
    fn tax_elimination_releases_holdings_and_passes_turn() {
        let mut room = room_with(3);
        {
            let mover = room.player_mut(1).unwrap();
            mover.sanity = 5;
            mover.owned.insert(3);
        }
        roll_and_resolve(&mut room, &mut Scripted::dice(&[4]));

        assert!(room.player(1).unwrap().eliminated);
        assert!(room.player(1).unwrap().owned.is_empty());
        assert_eq!(room.owner_of(3), None);
        assert_eq!(room.phase(), &TurnPhase::Roll);
        assert_eq!(room.current_slot, 2);
    }

    #[test]
    fn send_to_jail_moves_to_jail_tile() {
        let mut room = room_with(2);
        room.player_mut(1).unwrap().position = 19;
        roll_and_resolve(&mut room, &mut Scripted::dice(&[2]));
        assert_eq!(room.player(1).unwrap().position, 7);
        assert_eq!(room.current_slot, 2);
    }

    #[test]
    fn event_loss_waits_for_display_before_ending_turn() {
        let mut room = room_with(2);
        let mut rng = Scripted::dice(&[2]);
        rng.events.push_back(Polarity::Loss);
        let out = roll_and_resolve(&mut room, &mut rng);

        assert_eq!(room.player(1).unwrap().sanity, 90);
        assert_eq!(room.phase(), &TurnPhase::Animating);
        let pending = out.schedule.unwrap();
        assert_eq!(pending.continuation, Continuation::FinishEvent);

        resume(&mut room, &Rules::default(), pending, &mut rng).unwrap();
        assert_eq!(room.phase(), &TurnPhase::Roll);
        assert_eq!(room.current_slot, 2);
    }

    #[test]
    fn stale_continuation_is_rejected() {
        let mut room = room_with(2);
        let mut rng = Scripted::dice(&[1]);
        let pending = roll(&mut room, 1, &mut rng).unwrap().schedule.unwrap();
        resume(&mut room, &Rules::default(), pending, &mut rng).unwrap();

        let err = resume(&mut room, &Rules::default(), pending, &mut rng).unwrap_err();
        assert_eq!(err, Rejection::Stale);
    }

    #[test]
    fn end_of_turn_skips_disconnected_and_eliminated_seats() {
        let mut room = room_with(4);
        room.player_mut(2).unwrap().connected = false;
        room.player_mut(3).unwrap().eliminated = true;
        let mut out = Outcome::default();
        end_turn(&mut room, &mut out);
        assert_eq!(room.current_slot, 4);
        end_turn(&mut room, &mut out);
        assert_eq!(room.current_slot, 1);
    }

    #[test]
    fn end_of_turn_keeps_current_when_nobody_else_can_play() {
        let mut room = room_with(2);
        room.player_mut(2).unwrap().connected = false;
        room.player_mut(1).unwrap().connected = false;
        let mut out = Outcome::default();
        end_turn(&mut room, &mut out);
        assert_eq!(room.current_slot, 1);
        assert_eq!(room.phase(), &TurnPhase::Roll);
    }

    #[test]
    fn countdown_ticks_down_then_resets_round() {
        let rules = Rules::default();
        let mut room = room_with(3);
        room.player_mut(1).unwrap().owned.insert(1);
        room.player_mut(2).unwrap().sanity = 0;
        let mut out = Outcome::default();
        eliminate(&mut room, &rules, 2, &mut out);
        assert_eq!(room.phase(), &TurnPhase::Roll);
        eliminate(&mut room, &rules, 3, &mut out);
        assert_eq!(room.phase(), &TurnPhase::Ended { winner: 1 });

        let mut rng = Scripted::default();
        let mut pending = room.pending.unwrap();
        let mut ticks = vec![rules.restart_countdown_secs];
        loop {
            let out = resume(&mut room, &rules, pending, &mut rng).unwrap();
            for event in &out.events {
                if let RoomEvent::Countdown { seconds_left } = event {
                    ticks.push(*seconds_left);
                }
            }
            match out.schedule {
                Some(next) => pending = next,
                None => break,
            }
        }

        assert_eq!(ticks, (0..=10).rev().collect::<Vec<_>>());
        assert_eq!(room.phase(), &TurnPhase::Roll);
        for player in &room.players {
            assert_eq!(player.sanity, 100);
            assert_eq!(player.position, 0);
            assert!(player.owned.is_empty());
            assert!(!player.eliminated);
        }
        assert!(room.player(4).unwrap().session_token.is_none());
    }

    #[test]
    fn disconnect_of_current_player_passes_the_turn() {
        let mut room = room_with(2);
        let connection = room.player(1).unwrap().connection.unwrap();
        disconnect(&mut room, connection).unwrap();

        let player = room.player(1).unwrap();
        assert!(!player.connected);
        assert!(player.session_token.is_some());
        assert_eq!(room.current_slot, 2);
        assert_eq!(
            disconnect(&mut room, connection).unwrap_err(),
            Rejection::Superseded
        );
    }

    #[test]
    fn disconnect_during_animation_still_resolves_move() {
        let mut room = room_with(2);
        let mut rng = Scripted::dice(&[3]);
        let pending = roll(&mut room, 1, &mut rng).unwrap().schedule.unwrap();
        let connection = room.player(1).unwrap().connection.unwrap();
        disconnect(&mut room, connection).unwrap();

        resume(&mut room, &Rules::default(), pending, &mut rng).unwrap();
        assert_eq!(room.player(1).unwrap().position, 3);
    }

    #[test]
    fn reattach_resumes_stalled_turn() {
        let mut room = room_with(2);
        for slot in 1..=2 {
            room.player_mut(slot).unwrap().connected = false;
            room.player_mut(slot).unwrap().connection = None;
        }
        room.current_slot = 1;
        reattach(&mut room, 2, ConnectionId::new_v4()).unwrap();
        assert_eq!(room.current_slot, 2);
        assert_eq!(room.phase(), &TurnPhase::Roll);
    }

    #[test]
    fn eliminated_seat_never_keeps_the_turn() {
        let mut room = room_with(3);
        for slot in [2, 3] {
            let player = room.player_mut(slot).unwrap();
            player.connected = false;
            player.connection = None;
        }
        room.player_mut(1).unwrap().sanity = 5;
        roll_and_resolve(&mut room, &mut Scripted::dice(&[4]));

        assert!(room.player(1).unwrap().eliminated);
        assert_eq!(room.phase(), &TurnPhase::Roll);
        assert_eq!(room.current_slot, 2);

        let mut rng = Scripted::dice(&[1]);
        assert_eq!(
            roll(&mut room, 1, &mut rng).unwrap_err(),
            Rejection::Eliminated(1)
        );
        assert!(room.player(1).unwrap().owned.is_empty());
    }

    #[test]
    fn eliminated_player_cannot_roll_or_buy() {
        let mut room = room_with(2);
        roll_and_resolve(&mut room, &mut Scripted::dice(&[1]));
        room.player_mut(1).unwrap().eliminated = true;

        assert_eq!(decide(&mut room, 1, true).unwrap_err(), Rejection::Eliminated(1));
        assert_eq!(room.owner_of(1), None);

        room.machine.apply(TurnEvent::TurnEnded).unwrap();
        let mut rng = Scripted::dice(&[1]);
        assert_eq!(
            roll(&mut room, 1, &mut rng).unwrap_err(),
            Rejection::Eliminated(1)
        );
        assert_invariants(&room);
    }

    #[test]
    fn disconnect_of_a_trade_party_cancels_the_trade() {
        let rules = Rules::default();
        for leaving in [1, 2] {
            let mut room = room_with(3);
            room.player_mut(2).unwrap().owned.insert(5);
            trade::offer(&mut room, &rules, 1, 5, 30).unwrap();
            assert_eq!(room.phase(), &TurnPhase::Trading);

            let connection = room.player(leaving).unwrap().connection.unwrap();
            let out = disconnect(&mut room, connection).unwrap();

            assert!(out.state_changed);
            assert!(room.trade.is_none());
            assert_eq!(room.owner_of(5), Some(2));
            assert_eq!(room.player(1).unwrap().sanity, 100);
            assert_eq!(room.phase(), &TurnPhase::Roll);
            let expected_current = if leaving == 1 { 2 } else { 1 };
            assert_eq!(room.current_slot, expected_current);
        }
    }
}
