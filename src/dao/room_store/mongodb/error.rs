use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

/// Result alias for MongoDB room store calls.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// What went wrong while talking to MongoDB.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// A required environment variable is not set.
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// The connection URI does not parse.
    #[error("invalid MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    /// The client could not be built from the options.
    #[error("could not build a MongoDB client")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    /// The server never answered the startup ping.
    #[error("MongoDB did not answer ping after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    /// A periodic health ping failed.
    #[error("MongoDB health ping failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    /// The activity index could not be created.
    #[error("could not create index `{index}` on `{collection}`")]
    EnsureIndex {
        collection: String,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    /// Upserting a room failed.
    #[error("could not write room `{id}`")]
    SaveRoom {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    /// Deleting a room failed.
    #[error("could not delete room `{id}`")]
    DeleteRoom {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    /// Listing or clearing the collection failed.
    #[error("room collection {operation} failed")]
    Collection {
        operation: &'static str,
        #[source]
        source: MongoError,
    },
    /// A stored document does not decode into a room.
    #[error("room document `{id}` is malformed")]
    Decode {
        id: String,
        #[source]
        source: mongodb::bson::error::Error,
    },
}
