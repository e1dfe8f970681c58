//! Failures raised by the CouchDB room store.

use reqwest::{Method, StatusCode};
use thiserror::Error;

/// Result alias for CouchDB room store calls.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// What went wrong while talking to CouchDB.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// A required environment variable is not set.
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// The HTTP client could not be built.
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The request never got a response.
    #[error("CouchDB {method} `{path}` could not be sent")]
    Transport {
        method: Method,
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with a status the store does not handle.
    #[error("CouchDB {method} `{path}` answered {status}")]
    Status {
        method: Method,
        path: String,
        status: StatusCode,
    },
    /// The response body was not the JSON shape CouchDB documents.
    #[error("CouchDB response for `{path}` could not be read")]
    Body {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// A room document exists but does not decode into a room.
    #[error("room document `{doc_id}` is malformed")]
    CorruptRoom {
        doc_id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CouchDaoError {
    pub(super) fn transport(method: Method, path: &str, source: reqwest::Error) -> Self {
        Self::Transport {
            method,
            path: path.to_owned(),
            source,
        }
    }

    pub(super) fn status(method: Method, path: &str, status: StatusCode) -> Self {
        Self::Status {
            method,
            path: path.to_owned(),
            status,
        }
    }
}
