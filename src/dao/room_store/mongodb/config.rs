use std::{env, time::Duration};

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;
use tracing::debug;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DATABASE: &str = "sanity_board";
const DEFAULT_COLLECTION: &str = "rooms";
const PING_ATTEMPTS: u32 = 10;
const FIRST_PING_BACKOFF: Duration = Duration::from_millis(250);
const MAX_PING_BACKOFF: Duration = Duration::from_secs(5);

/// Where the MongoDB room store keeps its documents.
#[derive(Clone)]
pub struct MongoConfig {
    /// Parsed client options.
    pub options: ClientOptions,
    /// Database holding the room collection.
    pub database_name: String,
    /// Collection with one document per room.
    pub collection_name: String,
}

impl MongoConfig {
    /// Parse `uri`, defaulting the database to `sanity_board`.
    pub async fn from_uri(uri: &str, database: Option<&str>) -> MongoResult<Self> {
        let options = ClientOptions::parse(uri)
            .await
            .map_err(|source| MongoDaoError::InvalidUri {
                uri: uri.to_owned(),
                source,
            })?;

        Ok(Self {
            options,
            database_name: database.unwrap_or(DEFAULT_DATABASE).to_owned(),
            collection_name: DEFAULT_COLLECTION.to_owned(),
        })
    }

    /// Read `MONGO_URI` (required), `MONGO_DB` and `MONGO_ROOMS_COLLECTION`.
    pub async fn from_env() -> MongoResult<Self> {
        let uri = env::var("MONGO_URI")
            .map_err(|_| MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let mut config = Self::from_uri(&uri, env::var("MONGO_DB").ok().as_deref()).await?;
        if let Ok(collection) = env::var("MONGO_ROOMS_COLLECTION") {
            config.collection_name = collection;
        }
        Ok(config)
    }

    /// Open a client and wait for the server to answer `ping`.
    pub(super) async fn open(&self) -> MongoResult<Database> {
        let client = Client::with_options(self.options.clone())
            .map_err(|source| MongoDaoError::ClientConstruction { source })?;
        let database = client.database(&self.database_name);

        let mut backoff = FIRST_PING_BACKOFF;
        let mut attempt = 1;
        loop {
            match database.run_command(doc! { "ping": 1 }).await {
                Ok(_) => return Ok(database),
                Err(source) if attempt >= PING_ATTEMPTS => {
                    return Err(MongoDaoError::InitialPing {
                        attempts: attempt,
                        source,
                    });
                }
                Err(err) => {
                    debug!(attempt, error = %err, "MongoDB not answering yet");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_PING_BACKOFF);
                    attempt += 1;
                }
            }
        }
    }
}
