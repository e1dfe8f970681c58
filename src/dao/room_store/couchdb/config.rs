use std::{env, time::Duration};

use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "sanity_board";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Connection settings for the CouchDB room store.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server root, e.g. `http://localhost:5984`.
    pub base_url: String,
    /// Database holding the `room::<uuid>` documents.
    pub database: String,
    /// Basic-auth user and password, when the server requires them.
    pub credentials: Option<(String, String)>,
    /// Upper bound for a single HTTP round trip.
    pub request_timeout: Duration,
}

impl CouchConfig {
    /// Settings for an unauthenticated server.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            credentials: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Read `COUCH_BASE_URL` (required), `COUCH_DB`, `COUCH_USERNAME`/`COUCH_PASSWORD`
    /// and `COUCH_TIMEOUT_SECS`.
    pub fn from_env() -> CouchResult<Self> {
        let base_url = env::var("COUCH_BASE_URL").map_err(|_| CouchDaoError::MissingEnvVar {
            var: "COUCH_BASE_URL",
        })?;
        let database = env::var("COUCH_DB").unwrap_or_else(|_| DEFAULT_DATABASE.to_owned());

        let mut config = Self::new(base_url, database);
        config.credentials = env::var("COUCH_USERNAME")
            .ok()
            .zip(env::var("COUCH_PASSWORD").ok());
        if let Some(secs) = env::var("COUCH_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
        {
            config.request_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_has_no_credentials_and_a_default_timeout() {
        let config = CouchConfig::new("http://localhost:5984/", "rooms");
        assert!(config.credentials.is_none());
        assert_eq!(config.request_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.database, "rooms");
    }
}
