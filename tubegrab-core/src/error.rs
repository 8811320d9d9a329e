//! The errors that can occur.

use crate::model::MediaKind;
use std::time::Duration;
use thiserror::Error;

/// A type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The possible errors that can occur.
#[derive(Debug, Error)]
pub enum Error {
    /// An error occurred while running the runtime.
    #[error("An error occurred while running the runtime: {0}")]
    Runtime(#[from] tokio::task::JoinError),
    /// An error occurred while interacting with the file system.
    #[error("An IO error occurred: {0}")]
    IO(#[from] std::io::Error),
    /// An error occurred while transferring a stream.
    #[error("An error occurred while fetching: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// An error occurred while parsing JSON.
    #[error("An error occurred while parsing JSON: {0}")]
    Serde(#[from] serde_json::Error),
    /// An error occurred while writing audio tags.
    #[error("An error occurred while tagging: {0}")]
    Tag(#[from] id3::Error),

    /// The stream provider failed; usually transient.
    #[error("Provider error: {0}")]
    Provider(String),
    /// The source cannot be fetched at all (age gate, sign-in, members-only, private).
    #[error("Access restricted: {0}")]
    AccessRestricted(String),
    /// No stream satisfies the request.
    #[error("No matching {kind} stream available for container '{container}'")]
    NoMatchingStream {
        /// The requested media kind.
        kind: MediaKind,
        /// The requested container or audio format.
        container: String,
    },
    /// The stream provider executable could not be found.
    #[error("Stream provider not available: {0}")]
    ProviderMissing(String),
    /// The transcoder executable could not be found.
    #[error("Transcoder not available: {0}")]
    TranscoderMissing(String),
    /// An error occurred while running a command.
    #[error("Failed to execute command: {0}")]
    Command(String),
    /// An error occurred due to a timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    /// An error occurred manipulating a path.
    #[error("An invalid path was provided: {0}")]
    Path(String),
    /// The work was cancelled from outside.
    #[error("Interrupted by user")]
    Interrupted,

    /// An unknown error occurred.
    #[error("An unknown error occurred: {0}")]
    Unknown(String),
}

impl Error {
    /// Whether another attempt of the same unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::AccessRestricted(_)
                | Error::NoMatchingStream { .. }
                | Error::ProviderMissing(_)
                | Error::TranscoderMissing(_)
                | Error::Path(_)
                | Error::Interrupted
        )
    }

    /// Whether this error comes from the tool setup rather than from one item.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::ProviderMissing(_) | Error::TranscoderMissing(_))
    }
}
