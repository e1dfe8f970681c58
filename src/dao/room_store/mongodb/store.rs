use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, Database, IndexModel,
    bson::{Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
    models::{MongoRoomDocument, doc_id},
};
use crate::dao::{models::RoomEntity, room_store::RoomStore, storage::StorageResult};

const ACTIVITY_INDEX: &str = "room_updated_at_idx";

/// MongoDB-backed [`RoomStore`]: one document per room, keyed by the room id.
#[derive(Clone)]
pub struct MongoRoomStore {
    config: Arc<MongoConfig>,
    database: Arc<RwLock<Database>>,
}

impl MongoRoomStore {
    /// Connect, wait for the server and make sure the activity index exists.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = config.open().await?;
        let store = Self {
            config: Arc::new(config),
            database: Arc::new(RwLock::new(database)),
        };
        store.ensure_activity_index().await?;
        info!(
            database = %store.config.database_name,
            collection = %store.config.collection_name,
            "MongoDB room store ready"
        );
        Ok(store)
    }

    async fn rooms<T: Send + Sync>(&self) -> Collection<T> {
        self.database
            .read()
            .await
            .collection::<T>(&self.config.collection_name)
    }

    async fn ensure_activity_index(&self) -> MongoResult<()> {
        let index = IndexModel::builder()
            .keys(doc! { "updated_at": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some(ACTIVITY_INDEX.to_owned()))
                    .build(),
            )
            .build();

        self.rooms::<Document>()
            .await
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: self.config.collection_name.clone(),
                index: ACTIVITY_INDEX,
                source,
            })?;
        Ok(())
    }

    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reopen(&self) -> MongoResult<()> {
        let database = self.config.open().await?;
        *self.database.write().await = database;
        Ok(())
    }

    async fn save(&self, room: RoomEntity) -> MongoResult<()> {
        let id = room.id;
        let document = MongoRoomDocument::from(room);
        self.rooms::<MongoRoomDocument>()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveRoom { id, source })?;
        Ok(())
    }

    async fn load(&self) -> MongoResult<Vec<RoomEntity>> {
        let listing = |source: mongodb::error::Error| MongoDaoError::Collection {
            operation: "listing",
            source,
        };
        let documents: Vec<Document> = self
            .rooms::<Document>()
            .await
            .find(doc! {})
            .await
            .map_err(listing)?
            .try_collect()
            .await
            .map_err(listing)?;

        // Raw documents so a malformed record names its id.
        documents.into_iter().map(MongoRoomDocument::decode).collect()
    }

    async fn delete(&self, id: Uuid) -> MongoResult<bool> {
        let result = self
            .rooms::<Document>()
            .await
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::DeleteRoom { id, source })?;
        Ok(result.deleted_count > 0)
    }

    async fn clear_all(&self) -> MongoResult<()> {
        self.rooms::<Document>()
            .await
            .delete_many(doc! {})
            .await
            .map_err(|source| MongoDaoError::Collection {
                operation: "clearing",
                source,
            })?;
        Ok(())
    }
}

impl RoomStore for MongoRoomStore {
    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save(room).await.map_err(Into::into) })
    }

    fn load_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.load().await.map_err(Into::into) })
    }

    fn delete_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete(id).await.map_err(Into::into) })
    }

    fn clear(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.clear_all().await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.reopen().await.map_err(Into::into) })
    }
}
