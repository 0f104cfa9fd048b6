use shared::AssetType;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },

    #[error("resource not found: {path}")]
    NotFound { path: String },

    #[error("server error for {path}: {reason}")]
    Server { path: String, reason: String },

    #[error("failed to decode {what}: {reason}")]
    Decode { what: String, reason: String },

    #[error("expected a {expected} asset for '{asset_id}', got a {actual} asset")]
    WrongAssetType {
        asset_id: String,
        expected: AssetType,
        actual: AssetType,
    },

    #[error("no behavior registered under '{0}'")]
    UnknownBehavior(String),

    #[error("no map is loaded")]
    MapNotLoaded,

    #[error("no map session is open")]
    NoSession,

    #[error("map session closed")]
    SessionClosed,

    #[error("map session rejected: {0}")]
    Rejected(String),

    #[error("map session lost: {0}")]
    SessionLost(String),

    #[error("graphics unavailable: {0}")]
    Graphics(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode {
            what: "resource body".to_string(),
            reason: err.to_string(),
        }
    }
}
