/// Failures reported by a coordination store client.
///
/// `NoNode` and `NodeExists` must stay distinguishable from transport
/// errors: the serverset core treats both as success in specific places
/// (ancestor creation, double close).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    #[error("no node: {0}")]
    NoNode(String),

    #[error("node exists: {0}")]
    NodeExists(String),

    #[error("node not empty: {0}")]
    NotEmpty(String),

    #[error("session expired")]
    SessionExpired,

    #[error("connection loss: {0}")]
    ConnectionLoss(String),

    /// A sequential create returned a path without a numeric suffix.
    #[error("created node has no sequence suffix: {0}")]
    MissingSequence(String),
}

/// Shared error type used across all serversets crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("registration under {path}: {source}")]
    Registration {
        path: String,
        #[source]
        source: CoordinationError,
    },

    #[error("watch on {path}: {source}")]
    WatchEstablishment {
        path: String,
        #[source]
        source: CoordinationError,
    },

    #[error("coordination: {0}")]
    Coordination(#[from] CoordinationError),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("coordination session lost")]
    SessionLost,

    #[error("refresh gave up after {0} attempts")]
    RefreshExhausted(u32),

    #[error("config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
