//! Room store keeping one JSON document per room in a local directory.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

use crate::dao::{
    models::RoomEntity,
    room_store::RoomStore,
    storage::{StorageError, StorageResult},
};

const EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "json.tmp";

/// Convenient result alias returning [`FileStoreError`] failures.
pub type FileResult<T> = Result<T, FileStoreError>;

/// Failures that can occur while reading or writing room files.
#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("failed to create storage directory `{path}`")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to list storage directory `{path}`")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read `{path}`")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write `{path}`")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove `{path}`")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode room `{id}`")]
    Encode {
        id: Uuid,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode `{path}`")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<FileStoreError> for StorageError {
    fn from(err: FileStoreError) -> Self {
        match err {
            FileStoreError::Decode { path, source } => {
                StorageError::corrupt(path.display().to_string(), source)
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}

/// Directory-backed [`RoomStore`] implementation.
#[derive(Clone)]
pub struct FileRoomStore {
    dir: Arc<PathBuf>,
}

impl FileRoomStore {
    /// Open the store, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> FileResult<Self> {
        let store = Self {
            dir: Arc::new(dir.into()),
        };
        store.ensure_dir().await?;
        Ok(store)
    }

    /// Directory holding the room files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn ensure_dir(&self) -> FileResult<()> {
        fs::create_dir_all(self.dir.as_path())
            .await
            .map_err(|source| FileStoreError::CreateDir {
                path: self.dir.to_path_buf(),
                source,
            })
    }

    fn room_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.{EXTENSION}"))
    }

    async fn save(&self, room: RoomEntity) -> FileResult<()> {
        let payload = serde_json::to_vec_pretty(&room).map_err(|source| FileStoreError::Encode {
            id: room.id,
            source,
        })?;

        let target = self.room_path(room.id);
        let temp = self.dir.join(format!("{}.{TEMP_EXTENSION}", room.id));
        fs::write(&temp, payload)
            .await
            .map_err(|source| FileStoreError::Write {
                path: temp.clone(),
                source,
            })?;
        fs::rename(&temp, &target)
            .await
            .map_err(|source| FileStoreError::Write {
                path: target,
                source,
            })
    }

    async fn room_files(&self) -> FileResult<Vec<PathBuf>> {
        let mut entries = fs::read_dir(self.dir.as_path())
            .await
            .map_err(|source| FileStoreError::ReadDir {
                path: self.dir.to_path_buf(),
                source,
            })?;

        let mut files = Vec::new();
        loop {
            let entry = entries
                .next_entry()
                .await
                .map_err(|source| FileStoreError::ReadDir {
                    path: self.dir.to_path_buf(),
                    source,
                })?;
            let Some(entry) = entry else {
                break;
            };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    async fn load(&self) -> FileResult<Vec<RoomEntity>> {
        let mut rooms = Vec::new();
        for path in self.room_files().await? {
            let bytes = fs::read(&path)
                .await
                .map_err(|source| FileStoreError::Read {
                    path: path.clone(),
                    source,
                })?;
            let room = serde_json::from_slice::<RoomEntity>(&bytes)
                .map_err(|source| FileStoreError::Decode { path, source })?;
            rooms.push(room);
        }
        Ok(rooms)
    }

    async fn delete(&self, id: Uuid) -> FileResult<bool> {
        let path = self.room_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(FileStoreError::Remove { path, source }),
        }
    }

    async fn clear_all(&self) -> FileResult<()> {
        for path in self.room_files().await? {
            fs::remove_file(&path)
                .await
                .map_err(|source| FileStoreError::Remove { path, source })?;
        }
        Ok(())
    }
}

impl RoomStore for FileRoomStore {
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
        Box::pin(async move {
            fs::metadata(store.dir.as_path())
                .await
                .map(|_| ())
                .map_err(|source| {
                    FileStoreError::ReadDir {
                        path: store.dir.to_path_buf(),
                        source,
                    }
                    .into()
                })
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_dir().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use super::*;
    use crate::state::{board::Board, room::Room};

    fn entity() -> RoomEntity {
        RoomEntity::from(&Room::new(Arc::new(Board::default()), 100))
    }

    #[tokio::test]
    async fn saved_rooms_are_loaded_back() {
        let dir = tempdir().unwrap();
        let store = FileRoomStore::open(dir.path().join("rooms")).await.unwrap();
        let first = entity();
        let second = entity();

        store.save_room(first.clone()).await.unwrap();
        store.save_room(second.clone()).await.unwrap();
        store.save_room(first.clone()).await.unwrap();

        let mut loaded = store.load_rooms().await.unwrap();
        loaded.sort_by_key(|room| room.id);
        let mut expected = vec![first, second];
        expected.sort_by_key(|room| room.id);
        assert_eq!(loaded, expected);
    }

    #[tokio::test]
    async fn delete_and_clear_remove_records() {
        let dir = tempdir().unwrap();
        let store = FileRoomStore::open(dir.path()).await.unwrap();
        let room = entity();
        store.save_room(room.clone()).await.unwrap();
        store.save_room(entity()).await.unwrap();

        assert!(store.delete_room(room.id).await.unwrap());
        assert!(!store.delete_room(room.id).await.unwrap());
        assert_eq!(store.load_rooms().await.unwrap().len(), 1);

        store.clear().await.unwrap();
        assert!(store.load_rooms().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn garbage_file_is_reported_as_corrupt() {
        let dir = tempdir().unwrap();
        let store = FileRoomStore::open(dir.path()).await.unwrap();
        std::fs::write(dir.path().join(format!("{}.json", Uuid::new_v4())), b"{ nope").unwrap();

        let err = store.load_rooms().await.unwrap_err();
        assert!(err.is_corrupt());
    }

    #[tokio::test]
    async fn leftover_temp_files_are_ignored() {
        let dir = tempdir().unwrap();
        let store = FileRoomStore::open(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("half-written.json.tmp"), b"{").unwrap();

        assert!(store.load_rooms().await.unwrap().is_empty());
        store.health_check().await.unwrap();
    }
}
