use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("asset {path}: {reason}")]
    Asset { path: PathBuf, reason: String },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("start map '{0}' is not among the loaded maps")]
    UnknownStartMap(String),
}
