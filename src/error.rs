/// Errors raised while retrieving the authoritative scene snapshot.
///
/// Every variant means "no scene yet": the fetcher never hands back a
/// partially decoded scene.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid scene URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Scene endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Scene payload could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Scene payload rejected: {0}")]
    InvalidScene(String),
}

/// A websocket message that is not a valid patch batch.
///
/// Recovered locally by the delta channel: the message is dropped and the
/// connection stays open.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed patch batch: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Expected a JSON array or object, got: {0}")]
    NotABatch(String),
}

/// All errors that can surface from the sync client outside of the
/// render loop.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("{0}")]
    Custom(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
