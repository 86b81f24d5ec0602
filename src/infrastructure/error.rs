use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Schedule conflict: {0}")]
    Conflict(String),
    #[error("Sleep window conflict: {0}")]
    SleepConflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),
}
