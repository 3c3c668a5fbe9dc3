use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeakerError {
    #[error("speaker store error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to parse user info: {0}")]
    Parse(String),

    #[error("user {0} not found")]
    NotFound(i64),
}
