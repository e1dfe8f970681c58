use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientCommand, LogSeverity, ServerMessage},
    error::ServiceError,
    services::{matchmaking, room_service},
    state::{ConnectionHandle, SharedState, room::ConnectionId},
};

/// Failure to hand a frame to a connection's writer task.
#[derive(Debug, Error)]
pub enum SendError {
    /// Writer channel closed - connection should be terminated immediately.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Handle the full lifecycle for an individual player WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sender.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    let connection = register_connection(&state, outbound_tx.clone());
    let join_timeout = state.config().timings().join_timeout;

    let initial_message = match tokio::time::timeout(join_timeout, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            state.connections().remove(&connection);
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            reject_and_close(&state, connection, "expected a join message");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            state.connections().remove(&connection);
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!(%connection, "websocket join timed out");
            state.close_connection(connection);
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let payload = match ClientCommand::from_json_str(&initial_message) {
        Ok(ClientCommand::Join(payload)) => payload,
        Ok(_) => {
            warn!(%connection, "first message was not join");
            reject_and_close(&state, connection, "expected a join message");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(%connection, error = %err, "failed to parse or validate join message");
            reject_and_close(&state, connection, &err.to_string());
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let binding = match matchmaking::join(&state, connection, &payload).await {
        Ok(binding) => binding,
        Err(ServiceError::RoomFull) => {
            info!(%connection, "no room available, turning player away");
            state.send_to(connection, &ServerMessage::RoomFull, "room_full");
            state.close_connection(connection);
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(%connection, error = %err, "join failed");
            reject_and_close(&state, connection, &err.to_string());
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    info!(
        %connection,
        room_id = %binding.room_id,
        slot = binding.slot,
        "player connected"
    );

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(%connection, payload = %text, "received player message");

                match ClientCommand::from_json_str(&text) {
                    Ok(ClientCommand::Join(_)) => {
                        warn!(%connection, "ignoring duplicate join message");
                    }
                    Ok(command) => {
                        // Rejections are already reported to the sender.
                        let _ = room_service::handle_command(&state, binding, command).await;
                    }
                    Err(err) => {
                        warn!(%connection, error = %err, "failed to parse or validate player message");
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%connection, "player closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%connection, error = %err, "websocket error");
                break;
            }
        }
    }

    state.connections().remove(&connection);
    room_service::handle_disconnect(&state, binding).await;
    info!(%connection, room_id = %binding.room_id, slot = binding.slot, "player disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Register a fresh connection so messages can be routed to it.
pub fn register_connection(
    state: &SharedState,
    tx: mpsc::UnboundedSender<Message>,
) -> ConnectionId {
    let id = Uuid::new_v4();
    state.connections().insert(id, ConnectionHandle { id, tx });
    id
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Returns `Ok(())` if the message was queued or if serialization failed
/// (permanent error, no point retrying). Returns
/// `Err(SendError::ConnectionClosed)` if the writer channel is closed.
pub fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
    context: &str,
) -> Result<(), SendError>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, context, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into())).map_err(|_| {
        debug!(context, "writer closed, dropping message");
        SendError::ConnectionClosed
    })
}

fn reject_and_close(state: &SharedState, connection: ConnectionId, reason: &str) {
    state.send_to(
        connection,
        &ServerMessage::log(format!("Join refused: {reason}"), LogSeverity::Error),
        "join_refused",
    );
    state.close_connection(connection);
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
