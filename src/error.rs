use std::io;
use std::result::Result as StdResult;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(String),
    #[error("upstream returned HTTP {0}")]
    UpstreamStatus(u16),
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// True for failures that mean "no data could be acquired right now";
    /// the caller should answer with a retryable service-unavailable.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::UpstreamStatus(_) | Error::Extraction(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Error::UpstreamStatus(status.as_u16())
        } else if err.is_decode() {
            Error::Extraction(err.to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = StdResult<T, Error>;
