// Error types for the boxoffice services
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoxofficeError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Queue error: {0}")]
    Queue(#[from] lapin::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache entry: {0}")]
    CorruptCacheEntry(String),

    #[error("Query aborted after {retries} conflicting attempts")]
    TxnConflict { retries: u32 },

    #[error("Row {row_id} of event {event_id}, section {section_id} is not cached")]
    RowNotCached {
        event_id: i64,
        section_id: i64,
        row_id: i64,
    },

    #[error("Seat {seat_number} is not available")]
    SeatUnavailable { seat_number: usize },

    #[error("No active connection for session {0}")]
    NoActiveConnection(String),

    #[error("Connection already registered for session {0}")]
    ConnectionExists(String),

    #[error("Event {0} does not exist")]
    EventNotFound(i64),
}

impl BoxofficeError {
    /// Whether redelivering the triggering message could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BoxofficeError::Redis(_)
                | BoxofficeError::Queue(_)
                | BoxofficeError::Database(_)
                | BoxofficeError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BoxofficeError>;
