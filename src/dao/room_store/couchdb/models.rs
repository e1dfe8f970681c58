use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::models::RoomEntity;

pub const ROOM_PREFIX: &str = "room::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    #[serde(default)]
    pub value: Option<RevValue>,
    #[serde(default)]
    pub doc: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RevValue {
    pub rev: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchRoomDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub room: RoomEntity,
}

impl From<(RoomEntity, Option<String>)> for CouchRoomDocument {
    fn from((room, rev): (RoomEntity, Option<String>)) -> Self {
        Self {
            id: room_doc_id(room.id),
            rev,
            room,
        }
    }
}

/// Minimal projection used to fetch the current revision of a document.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    #[serde(rename = "_rev")]
    pub rev: String,
}

pub fn room_doc_id(id: Uuid) -> String {
    format!("{ROOM_PREFIX}{id}")
}
