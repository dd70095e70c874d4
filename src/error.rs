use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssistantError {
    /// Introspection or execution against the data store failed.
    #[error("Store error: {0}")]
    Store(String),

    /// The completion service failed or returned an unusable payload.
    #[error("Completion service error: {0}")]
    Service(String),

    /// The model's payload was not a JSON object.
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Model did not return SQL")]
    NoSql,

    #[error("Only read-only queries may be executed: {0}")]
    ReadOnlyViolation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<rusqlite::Error> for AssistantError {
    fn from(err: rusqlite::Error) -> Self {
        AssistantError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;
