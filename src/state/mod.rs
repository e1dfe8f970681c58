pub mod board;
pub mod engine;
/// Room, player and trade records.
pub mod room;
/// Session token directory.
pub mod sessions;
/// Turn-phase state machine.
pub mod state_machine;
pub mod trade;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use axum::extract::ws::Message;
use dashmap::DashMap;
use indexmap::IndexMap;
use tokio::sync::{Mutex, MutexGuard, RwLock, mpsc, watch};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::room_store::RoomStore,
    dto::ws::ServerMessage,
    services::websocket_service::send_message_to_websocket,
    state::{
        engine::{Randomness, ThreadRandomness},
        room::{ConnectionId, Room},
        sessions::SessionDirectory,
    },
};

/// Application state shared across handlers and background tasks.
pub type SharedState = Arc<AppState>;

#[derive(Clone)]
/// Handle used to push messages to a connected player.
pub struct ConnectionHandle {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Queue drained by the connection's writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// A room together with its mutation lock and persistence flag.
pub struct RoomHandle {
    id: Uuid,
    room: Mutex<Room>,
    dirty: AtomicBool,
}

impl RoomHandle {
    /// Wrap a room; freshly wrapped rooms are dirty so they get persisted once.
    pub fn new(room: Room) -> Self {
        Self {
            id: room.id,
            room: Mutex::new(room),
            dirty: AtomicBool::new(true),
        }
    }

    /// Room identifier, readable without the lock.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Acquire the room's mutation lock.
    pub async fn lock(&self) -> MutexGuard<'_, Room> {
        self.room.lock().await
    }

    /// Flag the room for the next persistence flush.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Clear the dirty flag, returning whether it was set.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Whether the room has unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}

/// Central application state: room registry, sessions, live connections and storage.
pub struct AppState {
    config: Arc<AppConfig>,
    rooms: RwLock<IndexMap<Uuid, Arc<RoomHandle>>>,
    sessions: SessionDirectory,
    connections: DashMap<ConnectionId, ConnectionHandle>,
    randomness: Mutex<Box<dyn Randomness>>,
    room_store: RwLock<Option<Arc<dyn RoomStore>>>,
    degraded: watch::Sender<bool>,
    join_gate: Mutex<()>,
    restored: AtomicBool,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Self::with_randomness(config, Box::new(ThreadRandomness))
    }

    /// Same as [`AppState::new`] with a caller-provided source of dice and events.
    pub fn with_randomness(config: AppConfig, randomness: Box<dyn Randomness>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config: Arc::new(config),
            rooms: RwLock::new(IndexMap::new()),
            sessions: SessionDirectory::new(),
            connections: DashMap::new(),
            randomness: Mutex::new(randomness),
            room_store: RwLock::new(None),
            degraded: degraded_tx,
            join_gate: Mutex::new(()),
            restored: AtomicBool::new(false),
        })
    }

    /// Immutable configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current room store, if one is installed.
    pub async fn room_store(&self) -> Option<Arc<dyn RoomStore>> {
        let guard = self.room_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new room store implementation and leave degraded mode.
    pub async fn install_room_store(&self, store: Arc<dyn RoomStore>) {
        {
            let mut guard = self.room_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current room store and enter degraded mode.
    pub async fn clear_room_store(&self) {
        {
            let mut guard = self.room_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Room registry in creation order.
    pub fn rooms(&self) -> &RwLock<IndexMap<Uuid, Arc<RoomHandle>>> {
        &self.rooms
    }

    /// Look up a room by id.
    pub async fn room(&self, id: Uuid) -> Option<Arc<RoomHandle>> {
        self.rooms.read().await.get(&id).cloned()
    }

    /// Snapshot of every registered room handle, in creation order.
    pub async fn room_handles(&self) -> Vec<Arc<RoomHandle>> {
        self.rooms.read().await.values().cloned().collect()
    }

    /// Register a room, returning its handle.
    pub async fn insert_room(&self, room: Room) -> Arc<RoomHandle> {
        let handle = Arc::new(RoomHandle::new(room));
        self.rooms
            .write()
            .await
            .insert(handle.id(), Arc::clone(&handle));
        handle
    }

    /// Drop a room and every session bound to it.
    pub async fn remove_room(&self, id: Uuid) -> Option<Arc<RoomHandle>> {
        let removed = self.rooms.write().await.shift_remove(&id);
        if removed.is_some() {
            self.sessions.forget_room(id);
        }
        removed
    }

    /// Session token directory.
    pub fn sessions(&self) -> &SessionDirectory {
        &self.sessions
    }

    /// Registry of live sockets keyed by connection id.
    pub fn connections(&self) -> &DashMap<ConnectionId, ConnectionHandle> {
        &self.connections
    }

    /// Source of dice and event draws.
    pub fn randomness(&self) -> &Mutex<Box<dyn Randomness>> {
        &self.randomness
    }

    /// Global exclusion for matchmaking and room creation.
    pub fn join_gate(&self) -> &Mutex<()> {
        &self.join_gate
    }

    /// Record that persisted rooms were loaded, returning whether this is the first time.
    pub fn mark_restored(&self) -> bool {
        !self.restored.swap(true, Ordering::AcqRel)
    }

    /// Deliver a message to a single connection; unknown connections are ignored.
    pub fn send_to(&self, connection: ConnectionId, message: &ServerMessage, context: &str) {
        let Some(handle) = self.connections.get(&connection) else {
            return;
        };
        let tx = handle.tx.clone();
        drop(handle);

        if send_message_to_websocket(&tx, message, context).is_err() {
            self.connections.remove(&connection);
        }
    }

    /// Ask a socket to close; its handler finishes the cleanup.
    pub fn close_connection(&self, connection: ConnectionId) {
        if let Some((_, handle)) = self.connections.remove(&connection) {
            let _ = handle.tx.send(Message::Close(None));
        }
    }

    /// Deliver a message to every live connection of `room`.
    pub fn broadcast(&self, room: &Room, message: &ServerMessage, context: &str) {
        for connection in room.connections() {
            self.send_to(connection, message, context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::board::Board;

    #[tokio::test]
    async fn registry_keeps_creation_order_and_forgets_sessions() {
        let state = AppState::new(AppConfig::default());
        let board = Arc::new(Board::default());
        let first = state.insert_room(Room::new(Arc::clone(&board), 100)).await;
        let second = state.insert_room(Room::new(board, 100)).await;
        state.sessions().bind("first-token", first.id(), 1);

        let ids: Vec<Uuid> = state.room_handles().await.iter().map(|h| h.id()).collect();
        assert_eq!(ids, vec![first.id(), second.id()]);

        state.remove_room(first.id()).await;
        assert!(state.room(first.id()).await.is_none());
        assert!(state.sessions().resolve("first-token").is_none());
    }

    #[test]
    fn dirty_flag_is_taken_once() {
        let handle = RoomHandle::new(Room::new(Arc::new(Board::default()), 100));
        assert!(handle.take_dirty());
        assert!(!handle.take_dirty());
        handle.mark_dirty();
        assert!(handle.is_dirty());
    }

    #[test]
    fn degraded_flag_starts_set() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded());
        state.update_degraded(false);
        assert!(!state.is_degraded());
    }
}
