use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Everything that can go wrong talking to the backend or the offline cache.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("expected JSON response but received {content_type:?}: {body}")]
    UnexpectedContentType { content_type: String, body: String },

    #[error("failed to parse JSON response: {source}")]
    MalformedBody {
        #[source]
        source: serde_json::Error,
        body: String,
    },

    #[error("backend rejected {operation}: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },

    #[error("cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("{0} has no storage key on the backend")]
    MissingKey(String),

    #[error("{0} is not an audio or video file")]
    NotMedia(String),

    #[error("{0} requires a remote backend")]
    RemoteOnly(&'static str),

    #[error("file has no name")]
    EmptyName,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    pub(crate) fn rejected(operation: &'static str, message: Option<String>) -> Self {
        RegistryError::Rejected {
            operation,
            message: message.unwrap_or_else(|| "no reason given".to_string()),
        }
    }
}
