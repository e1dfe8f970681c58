#[cfg(feature = "couch-store")]
/// CouchDB room store.
pub mod couchdb;
pub mod file;
#[cfg(feature = "mongo-store")]
/// MongoDB room store.
pub mod mongodb;

use crate::dao::models::RoomEntity;
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the persistence layer for room snapshots.
pub trait RoomStore: Send + Sync {
    /// Insert or replace the record of `room.id`.
    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Load every stored room. Any unreadable record fails the whole load.
    fn load_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>>;
    /// Delete a room, returning whether a record existed.
    fn delete_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Drop every stored room.
    fn clear(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
