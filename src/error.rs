//! Error types shared by the engine.
//!
//! Task-level failures are not errors: they are [`FailureReason`] outcomes
//! reported through `AUTOMATION_RESULT`. The variants here cover the
//! plumbing underneath (storage, HTTP, page host, channels).
//!
//! [`FailureReason`]: crate::tasks::FailureReason

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Control plane error: {0}")]
    ControlPlane(String),

    #[error("Page error: {0}")]
    Page(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Queue invariant violated: {0}")]
    Invariant(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::ControlPlane(e.to_string())
    }
}
