use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid session cookie pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("failed to parse heartbeat: {0}")]
    Parse(String),

    #[error("mail address or password is not configured")]
    MissingCredentials,

    #[error("failed to login")]
    LoginFailed,

    #[error("not logged in after login")]
    NotLoggedIn,

    #[error(transparent)]
    Config(#[from] ConfigError),
}
