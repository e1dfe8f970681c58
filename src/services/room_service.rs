//! Command dispatch for seated players and delivery of engine outcomes.
//!
//! Every mutation happens under the room lock and its messages are queued
//! before the lock is released, so each room sees one total broadcast order.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::{
        room::{RoomView, TradeView},
        ws::{ClientCommand, DecisionChoice, LogSeverity, ServerMessage},
    },
    error::ServiceError,
    services::matchmaking::Binding,
    state::{
        RoomHandle, SharedState,
        engine::{self, Outcome, Rejection, RoomEvent},
        room::{PendingContinuation, Room},
        trade,
    },
};

/// Apply a command from a bound connection.
///
/// Rejected commands leave the room untouched and are echoed to the sender as
/// a warning.
pub async fn handle_command(
    state: &SharedState,
    binding: Binding,
    command: ClientCommand,
) -> Result<(), ServiceError> {
    let Some(handle) = state.room(binding.room_id).await else {
        return Err(ServiceError::NotFound(format!(
            "room `{}` not found",
            binding.room_id
        )));
    };

    let mut room = handle.lock().await;
    let result = apply_command(state, &mut room, binding, command).await;

    match result {
        Ok(outcome) => {
            publish(state, &handle, &room, outcome);
            Ok(())
        }
        Err(rejection) => {
            debug!(
                room_id = %binding.room_id,
                slot = binding.slot,
                %rejection,
                "command rejected"
            );
            state.send_to(
                binding.connection,
                &ServerMessage::log(rejection.to_string(), LogSeverity::Warn),
                "rejection",
            );
            Err(rejection.into())
        }
    }
}

async fn apply_command(
    state: &SharedState,
    room: &mut Room,
    binding: Binding,
    command: ClientCommand,
) -> Result<Outcome, Rejection> {
    let bound = room
        .player(binding.slot)
        .is_some_and(|player| player.connection == Some(binding.connection));
    if !bound {
        return Err(Rejection::Superseded);
    }

    let rules = state.config().rules();
    match command {
        ClientCommand::Roll => {
            let mut rng = state.randomness().lock().await;
            engine::roll(room, binding.slot, rng.as_mut())
        }
        ClientCommand::Decide { choice } => {
            engine::decide(room, binding.slot, choice == DecisionChoice::Buy)
        }
        ClientCommand::OfferTrade {
            tile_index,
            offer_amount,
        } => trade::offer(room, rules, binding.slot, tile_index, offer_amount),
        ClientCommand::RespondTrade { accepted } => {
            trade::respond(room, rules, binding.slot, accepted)
        }
        ClientCommand::Join(_) => Err(Rejection::WrongPhase {
            phase: room.phase().clone(),
        }),
    }
}

/// Mark the seat held by the binding's connection as disconnected.
///
/// A connection that was already superseded by a newer one is ignored.
pub async fn handle_disconnect(state: &SharedState, binding: Binding) {
    let Some(handle) = state.room(binding.room_id).await else {
        return;
    };

    let mut room = handle.lock().await;
    match engine::disconnect(&mut room, binding.connection) {
        Ok(outcome) => publish(state, &handle, &room, outcome),
        Err(rejection) => {
            debug!(room_id = %binding.room_id, slot = binding.slot, %rejection, "disconnect ignored");
        }
    }
}

/// Deliver an outcome produced while `room` is locked.
///
/// Room-wide events are broadcast in order, trade requests go to the owner
/// only, then the state update follows. The room is flagged for persistence
/// and the continuation, if any, is scheduled.
pub fn publish(state: &SharedState, handle: &Arc<RoomHandle>, room: &Room, outcome: Outcome) {
    for event in &outcome.events {
        if let RoomEvent::TradeRequested(trade) = event {
            if let Some(owner) = room.player(trade.owner).and_then(|p| p.connection) {
                let message = ServerMessage::TradeRequest {
                    trade: TradeView::from(trade),
                };
                state.send_to(owner, &message, "trade_request");
            }
            continue;
        }
        if let Some(message) = ServerMessage::broadcast_form(event) {
            state.broadcast(room, &message, "room_event");
        }
    }

    if outcome.state_changed {
        let message = ServerMessage::StateUpdate {
            room: RoomView::from(room),
        };
        state.broadcast(room, &message, "state_update");
    }

    if outcome.state_changed || outcome.schedule.is_some() {
        handle.mark_dirty();
    }

    if let Some(pending) = outcome.schedule {
        schedule_continuation(state, room.id, pending);
    }
}

/// Fire `pending` for `room_id` once its delay has elapsed.
pub fn schedule_continuation(state: &SharedState, room_id: Uuid, pending: PendingContinuation) {
    let delay = state.config().delay_for(pending.continuation);
    let state = Arc::clone(state);
    tokio::spawn(async move {
        sleep(delay).await;
        run_continuation(&state, room_id, pending).await;
    });
}

async fn run_continuation(state: &SharedState, room_id: Uuid, pending: PendingContinuation) {
    let Some(handle) = state.room(room_id).await else {
        debug!(%room_id, "room evicted before continuation fired");
        return;
    };

    let mut room = handle.lock().await;
    let result = {
        let mut rng = state.randomness().lock().await;
        engine::resume(&mut room, state.config().rules(), pending, rng.as_mut())
    };

    match result {
        Ok(outcome) => publish(state, &handle, &room, outcome),
        Err(Rejection::Stale) => {
            debug!(%room_id, ?pending, "dropping stale continuation");
        }
        Err(rejection) => {
            warn!(%room_id, ?pending, %rejection, "continuation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        config::AppConfig,
        dto::ws::JoinPayload,
        services::{matchmaking, websocket_service::register_connection},
        state::{
            AppState,
            engine::tests::Scripted,
            room::{Continuation, Slot},
            state_machine::TurnPhase,
        },
    };

    struct Seat {
        binding: Binding,
        rx: mpsc::UnboundedReceiver<Message>,
    }

    impl Seat {
        fn drain_types(&mut self) -> Vec<String> {
            let mut types = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                if let Message::Text(text) = message {
                    let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                    types.push(value["type"].as_str().unwrap().to_string());
                }
            }
            types
        }
    }

    async fn seat_players(state: &SharedState, count: usize) -> Vec<Seat> {
        let mut seats = Vec::new();
        for index in 0..count {
            let (tx, rx) = mpsc::unbounded_channel();
            let connection = register_connection(state, tx);
            let payload = JoinPayload {
                session_token: format!("player-token-{index}"),
                display_name: format!("Player {index}"),
            };
            let binding = matchmaking::join(state, connection, &payload).await.unwrap();
            seats.push(Seat { binding, rx });
        }
        seats
    }

    async fn phase_of(state: &SharedState, seat: &Seat) -> TurnPhase {
        let handle = state.room(seat.binding.room_id).await.unwrap();
        handle.lock().await.phase().clone()
    }

    #[tokio::test(start_paused = true)]
    async fn roll_resolves_after_the_animation_delay() {
        let state = AppState::with_randomness(AppConfig::default(), Box::new(Scripted::dice(&[4])));
        let mut seats = seat_players(&state, 2).await;
        seats.iter_mut().for_each(|seat| {
            seat.drain_types();
        });

        handle_command(&state, seats[0].binding, ClientCommand::Roll)
            .await
            .unwrap();
        assert_eq!(phase_of(&state, &seats[0]).await, TurnPhase::Animating);
        assert!(seats[1].drain_types().contains(&"dice_animation".to_string()));

        sleep(state.config().delay_for(Continuation::ResolveRoll) * 2).await;
        assert_ne!(phase_of(&state, &seats[0]).await, TurnPhase::Animating);
        assert!(seats[1].drain_types().contains(&"state_update".to_string()));
    }

    #[tokio::test]
    async fn out_of_turn_roll_is_rejected_and_echoed() {
        let state = AppState::new(AppConfig::default());
        let mut seats = seat_players(&state, 2).await;
        seats[1].drain_types();
        let before = phase_of(&state, &seats[0]).await;

        let err = handle_command(&state, seats[1].binding, ClientCommand::Roll)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Rejected(Rejection::NotYourTurn { slot: 2 })
        ));
        assert_eq!(seats[1].drain_types(), vec!["log".to_string()]);
        assert_eq!(phase_of(&state, &seats[0]).await, before);
    }

    #[tokio::test]
    async fn superseded_connection_cannot_act() {
        let state = AppState::new(AppConfig::default());
        let seats = seat_players(&state, 2).await;
        let stale = Binding {
            connection: Uuid::new_v4(),
            ..seats[0].binding
        };

        let err = handle_command(&state, stale, ClientCommand::Roll)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(Rejection::Superseded)));

        handle_disconnect(&state, stale).await;
        let handle = state.room(stale.room_id).await.unwrap();
        assert!(handle.lock().await.player(1).unwrap().connected);
    }

    #[tokio::test]
    async fn trade_request_reaches_only_the_owner() {
        let state = AppState::new(AppConfig::default());
        let mut seats = seat_players(&state, 3).await;
        let owner: Slot = seats[1].binding.slot;
        {
            let handle = state.room(seats[0].binding.room_id).await.unwrap();
            handle.lock().await.player_mut(owner).unwrap().owned.insert(1);
        }
        seats.iter_mut().for_each(|seat| {
            seat.drain_types();
        });

        handle_command(
            &state,
            seats[0].binding,
            ClientCommand::OfferTrade {
                tile_index: 1,
                offer_amount: 30,
            },
        )
        .await
        .unwrap();

        assert!(seats[1].drain_types().contains(&"trade_request".to_string()));
        assert!(!seats[2].drain_types().contains(&"trade_request".to_string()));
        assert_eq!(phase_of(&state, &seats[0]).await, TurnPhase::Trading);
    }

    #[tokio::test]
    async fn published_outcomes_mark_the_room_dirty() {
        let state = AppState::new(AppConfig::default());
        let seats = seat_players(&state, 2).await;
        let handle = state.room(seats[0].binding.room_id).await.unwrap();
        handle.take_dirty();

        handle_disconnect(&state, seats[1].binding).await;
        assert!(handle.is_dirty());
    }
}
