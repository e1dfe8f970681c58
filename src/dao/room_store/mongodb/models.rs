use mongodb::bson::{self, DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::dao::models::RoomEntity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomDocument {
    #[serde(rename = "_id")]
    id: String,
    updated_at: DateTime,
    room: RoomEntity,
}

impl From<RoomEntity> for MongoRoomDocument {
    fn from(value: RoomEntity) -> Self {
        Self {
            id: value.id.to_string(),
            updated_at: DateTime::from_system_time(value.last_activity),
            room: value,
        }
    }
}

impl MongoRoomDocument {
    /// Decode a raw document, reporting the offending key on failure.
    pub fn decode(raw: Document) -> MongoResult<RoomEntity> {
        let id = raw
            .get_str("_id")
            .map(str::to_owned)
            .unwrap_or_else(|_| "<unknown>".to_owned());
        bson::deserialize_from_document::<MongoRoomDocument>(raw)
            .map(|document| document.room)
            .map_err(|source| MongoDaoError::Decode { id, source })
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::state::{board::Board, room::Room};

    #[test]
    fn decode_round_trips_a_room_and_names_malformed_ids() {
        let room = Room::new(Arc::new(Board::default()), 100);
        let entity = RoomEntity::from(&room);
        let raw = bson::serialize_to_document(&MongoRoomDocument::from(entity)).unwrap();
        assert_eq!(MongoRoomDocument::decode(raw).unwrap().id, room.id);

        let broken = doc! { "_id": "room-1", "updated_at": DateTime::now(), "room": "nope" };
        match MongoRoomDocument::decode(broken) {
            Err(MongoDaoError::Decode { id, .. }) => assert_eq!(id, "room-1"),
            other => panic!("unexpected decode result: {other:?}"),
        }
    }
}
