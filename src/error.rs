use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Backend unavailable: {0}")]
    Backend(String),
    #[error("Message content is empty")]
    EmptyContent,
    #[error("Message content exceeds {max} characters")]
    ContentTooLong { max: usize },
    #[error("Message sender and receiver must differ")]
    SelfAddressed,
    #[error("Unknown profile: {0}")]
    UnknownProfile(Uuid),
}

pub type Result<T> = std::result::Result<T, SyncError>;
