use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;
use uuid::Uuid;

use crate::dao::{models::RoomEntity, room_store::RoomStore, storage::StorageResult};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CouchRoomDocument, END_SUFFIX, ROOM_PREFIX, RevisionOnly, room_doc_id,
    },
};

const ALL_DOCS: &str = "_all_docs";

/// CouchDB-backed [`RoomStore`] implementation storing `room::<uuid>` documents.
#[derive(Clone)]
pub struct CouchRoomStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchRoomStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .credentials
            .map(|(user, password)| (Arc::<str>::from(user), Arc::<str>::from(password)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authed(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let url = format!("{}/{}", self.base_url, self.database);

        let response = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::transport(Method::GET, &self.database, source))?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let created = self
                    .authed(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| {
                        CouchDaoError::transport(Method::PUT, &self.database, source)
                    })?;
                match created.status() {
                    status if status.is_success() => Ok(()),
                    // Another instance created it first.
                    StatusCode::PRECONDITION_FAILED => Ok(()),
                    status => Err(CouchDaoError::status(Method::PUT, &self.database, status)),
                }
            }
            other => Err(CouchDaoError::status(Method::GET, &self.database, other)),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::transport(Method::GET, doc_id, source))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response
                    .json::<T>()
                    .await
                    .map(Some)
                    .map_err(|source| CouchDaoError::Body {
                        path: doc_id.to_owned(),
                        source,
                    })
            }
            other => Err(CouchDaoError::status(Method::GET, doc_id, other)),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::transport(Method::PUT, doc_id, source))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            other => Err(CouchDaoError::status(Method::PUT, doc_id, other)),
        }
    }

    async fn delete_document(&self, doc_id: &str, rev: &str) -> CouchResult<bool> {
        let response = self
            .request(Method::DELETE, doc_id)
            .query(&[("rev", rev)])
            .send()
            .await
            .map_err(|source| CouchDaoError::transport(Method::DELETE, doc_id, source))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            other => Err(CouchDaoError::status(Method::DELETE, doc_id, other)),
        }
    }

    /// Rows whose id carries the room prefix, optionally with their bodies.
    async fn room_rows(&self, include_docs: bool) -> CouchResult<AllDocsResponse> {
        let query = [
            ("include_docs", include_docs.to_string()),
            ("startkey", format!("\"{ROOM_PREFIX}\"")),
            ("endkey", format!("\"{ROOM_PREFIX}{END_SUFFIX}\"")),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::transport(Method::GET, ALL_DOCS, source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CouchDaoError::status(Method::GET, ALL_DOCS, status));
        }

        response
            .json::<AllDocsResponse>()
            .await
            .map_err(|source| CouchDaoError::Body {
                path: ALL_DOCS.to_owned(),
                source,
            })
    }

    async fn save(&self, room: RoomEntity) -> CouchResult<()> {
        let doc_id = room_doc_id(room.id);
        let rev = self
            .get_document::<RevisionOnly>(&doc_id)
            .await?
            .map(|existing| existing.rev);
        let document = CouchRoomDocument::from((room, rev));
        self.put_document(&doc_id, &document).await
    }

    async fn load(&self) -> CouchResult<Vec<RoomEntity>> {
        self.room_rows(true)
            .await?
            .rows
            .into_iter()
            .filter_map(|row| row.doc.map(|doc| (row.id, doc)))
            .map(|(doc_id, doc)| {
                from_value::<CouchRoomDocument>(doc)
                    .map(|parsed| parsed.room)
                    .map_err(|source| CouchDaoError::CorruptRoom { doc_id, source })
            })
            .collect()
    }

    async fn delete(&self, id: Uuid) -> CouchResult<bool> {
        let doc_id = room_doc_id(id);
        match self.get_document::<RevisionOnly>(&doc_id).await? {
            Some(existing) => self.delete_document(&doc_id, &existing.rev).await,
            None => Ok(false),
        }
    }

    async fn clear_all(&self) -> CouchResult<()> {
        for row in self.room_rows(false).await?.rows {
            if let Some(value) = row.value {
                self.delete_document(&row.id, &value.rev).await?;
            }
        }
        Ok(())
    }

    async fn ping(&self) -> CouchResult<()> {
        let url = format!("{}/{}", self.base_url, self.database);
        let response = self
            .authed(self.client.head(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::transport(Method::HEAD, &self.database, source))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            other => Err(CouchDaoError::status(Method::HEAD, &self.database, other)),
        }
    }
}

impl RoomStore for CouchRoomStore {
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
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
