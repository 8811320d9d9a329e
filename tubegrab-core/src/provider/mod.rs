//! The remote stream provider seam.
//!
//! The orchestrator only talks to a [`StreamProvider`]: listing a source, listing a playlist, and opening
//! a byte transfer for one stream. [`ytdlp::YtDlpProvider`] is the shipped implementation.

use crate::error::{Error, Result};
use crate::model::{Playlist, SourceInfo, StreamDescriptor};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::header::USER_AGENT;
use std::fmt;
use std::pin::Pin;

pub mod ytdlp;

pub use ytdlp::YtDlpProvider;

/// A stream of byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// An opened transfer of one stream.
pub struct Transfer {
    /// The total size announced by the remote end, if any.
    pub total: Option<u64>,
    /// The chunks, in order.
    pub stream: ByteStream,
}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfer")
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

/// A remote catalogue of sources.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// Lists the streams of one source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccessRestricted`] when the source can never be fetched, [`Error::Provider`] otherwise.
    async fn list_streams(&self, source: &str) -> Result<SourceInfo>;

    /// Lists the entries of a playlist, in order.
    async fn list_playlist(&self, source: &str) -> Result<Playlist>;

    /// Opens a byte transfer for a stream previously returned by [`StreamProvider::list_streams`].
    async fn open_transfer(&self, stream: &StreamDescriptor) -> Result<Transfer>;
}

/// Opens a plain HTTP GET transfer.
///
/// # Arguments
///
/// * `client` - The client to send the request with.
/// * `url` - The URL to fetch.
///
/// # Errors
///
/// This function will return an error if the request fails or the server answers with an error status.
pub async fn http_transfer(client: &reqwest::Client, url: &str) -> Result<Transfer> {
    log::debug!("Opening transfer from {}", url);

    let response = client
        .get(url)
        .header(USER_AGENT, "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36")
        .send()
        .await?
        .error_for_status()?;

    let total = response.content_length();
    let stream = response
        .bytes_stream()
        .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(Error::from));

    Ok(Transfer {
        total,
        stream: Box::pin(stream),
    })
}
