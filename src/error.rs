use thiserror::Error;

#[derive(Error, Debug)]
pub enum GazetteError {
    #[error("Not in a gazette project. Run 'gazette init' first.")]
    NotInitialized,

    #[error("Already initialized. Remove .gazette/ to reinitialize.")]
    AlreadyInitialized,

    #[error("Insight not found: {0}")]
    InsightNotFound(String),

    #[error("Comment not found: {0}")]
    CommentNotFound(String),

    #[error("Ambiguous id '{0}': matches more than one comment")]
    AmbiguousId(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, GazetteError>;
