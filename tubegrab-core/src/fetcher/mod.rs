//! Tools for fetching one stream into a local file.

use crate::error::Result;
use crate::model::StreamDescriptor;
use crate::provider::StreamProvider;
use crate::utils::file_system;
use futures_util::StreamExt;
use progress::{ProgressReporter, TransferState};
use std::fmt;
use std::path::Path;
use std::time::Instant;
use tokio::io::AsyncWriteExt;

pub mod progress;

/// The fetcher writes the bytes of one stream to a destination file, reporting progress along the way.
#[derive(Debug, Clone)]
pub struct Fetcher {
    /// The number of bytes buffered before each write.
    buffer_size: usize,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fetcher(buffer={})", self.buffer_size)
    }
}

impl Fetcher {
    /// Creates a fetcher with a 1 MB write buffer.
    pub fn new() -> Self {
        Self {
            buffer_size: 1024 * 1024,
        }
    }

    /// Configures the number of bytes buffered before each write.
    ///
    /// # Arguments
    ///
    /// * `size` - The buffer size in bytes.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Fetches the stream and writes it to the given destination, truncating any previous content.
    /// Returns the number of bytes written.
    ///
    /// # Arguments
    ///
    /// * `provider` - The provider that listed the stream.
    /// * `stream` - The stream to fetch.
    /// * `destination` - The path where to write the stream.
    /// * `reporter` - Receives the progress of the transfer.
    ///
    /// # Errors
    ///
    /// This function will return an error if the transfer or a write fails. The partial file is left in place.
    pub async fn fetch(
        &self,
        provider: &dyn StreamProvider,
        stream: &StreamDescriptor,
        destination: impl AsRef<Path>,
        reporter: &dyn ProgressReporter,
    ) -> Result<u64> {
        let destination = destination.as_ref();
        log::debug!("Fetching {} to {}", stream, destination.display());

        let mut file = file_system::create_file(destination).await?;

        let mut transfer = provider.open_transfer(stream).await?;
        let total = transfer.total.or(stream.filesize);

        let label = file_system::try_name(destination).unwrap_or_else(|_| stream.id.clone());
        let mut handle = reporter.start(&label, total);
        let mut state = TransferState::new(total, Instant::now());

        let mut buffer = Vec::with_capacity(self.buffer_size);
        let mut written: u64 = 0;

        while let Some(chunk) = transfer.stream.next().await {
            let chunk = chunk?;
            buffer.extend_from_slice(&chunk);
            written += chunk.len() as u64;

            if buffer.len() >= self.buffer_size {
                file.write_all(&buffer).await?;
                buffer.clear();
            }

            let sample = state.sample(Instant::now(), written);
            handle.update(&sample);
        }

        if !buffer.is_empty() {
            file.write_all(&buffer).await?;
        }
        file.flush().await?;
        handle.finish();

        if let Some(expected) = total {
            if expected != written {
                log::warn!(
                    "Fetched {} bytes for {} but {} were announced",
                    written,
                    destination.display(),
                    expected
                );
            }
        }

        log::debug!("Fetched {} bytes to {}", written, destination.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::progress::{NoProgress, ProgressHandle, ProgressSample};
    use super::*;
    use crate::error::Error;
    use crate::model::{Playlist, SourceInfo};
    use crate::provider::Transfer;
    use async_trait::async_trait;
    use futures_util::stream;
    use std::sync::{Arc, Mutex};

    struct ChunkProvider {
        chunks: Vec<Result<Vec<u8>>>,
        total: Option<u64>,
    }

    #[async_trait]
    impl StreamProvider for ChunkProvider {
        async fn list_streams(&self, _source: &str) -> Result<SourceInfo> {
            unimplemented!()
        }

        async fn list_playlist(&self, _source: &str) -> Result<Playlist> {
            unimplemented!()
        }

        async fn open_transfer(&self, _stream: &StreamDescriptor) -> Result<Transfer> {
            let chunks: Vec<Result<Vec<u8>>> = self
                .chunks
                .iter()
                .map(|chunk| match chunk {
                    Ok(bytes) => Ok(bytes.clone()),
                    Err(_) => Err(Error::Provider("connection reset".to_string())),
                })
                .collect();

            Ok(Transfer {
                total: self.total,
                stream: Box::pin(stream::iter(chunks)),
            })
        }
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<ProgressSample>>>);

    impl ProgressReporter for Recorder {
        fn start(&self, _label: &str, _total: Option<u64>) -> Box<dyn ProgressHandle> {
            Box::new(self.clone())
        }
    }

    impl ProgressHandle for Recorder {
        fn update(&mut self, sample: &ProgressSample) {
            self.0.lock().unwrap().push(*sample);
        }

        fn finish(&mut self) {}
    }

    fn descriptor() -> StreamDescriptor {
        StreamDescriptor {
            id: "140".to_string(),
            url: None,
            container: "m4a".to_string(),
            mime_type: "audio/m4a".to_string(),
            has_video: false,
            has_audio: true,
            height: None,
            bitrate: Some(128.0),
            filesize: Some(9),
        }
    }

    #[tokio::test]
    async fn fetch_writes_every_chunk_and_reports_monotonic_progress() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("nested").join("track_audio.m4a");
        let provider = ChunkProvider {
            chunks: vec![Ok(b"abc".to_vec()), Ok(b"def".to_vec()), Ok(b"ghi".to_vec())],
            total: None,
        };
        let recorder = Recorder::default();

        let written = Fetcher::new()
            .with_buffer_size(4)
            .fetch(&provider, &descriptor(), &destination, &recorder)
            .await
            .unwrap();

        assert_eq!(written, 9);
        assert_eq!(tokio::fs::read(&destination).await.unwrap(), b"abcdefghi");

        let samples = recorder.0.lock().unwrap();
        let transferred: Vec<u64> = samples.iter().map(|s| s.transferred).collect();
        assert_eq!(transferred, vec![3, 6, 9]);
        assert_eq!(samples.last().unwrap().remaining, Some(0));
    }

    #[tokio::test]
    async fn fetch_truncates_previous_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("track_audio.m4a");
        tokio::fs::write(&destination, b"stale partial content from before")
            .await
            .unwrap();
        let provider = ChunkProvider {
            chunks: vec![Ok(b"new".to_vec())],
            total: Some(3),
        };

        Fetcher::new()
            .fetch(&provider, &descriptor(), &destination, &NoProgress)
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&destination).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn transport_error_aborts_and_leaves_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("track_audio.m4a");
        let provider = ChunkProvider {
            chunks: vec![
                Ok(b"abc".to_vec()),
                Err(Error::Provider("reset".to_string())),
            ],
            total: Some(9),
        };

        let err = Fetcher::new()
            .with_buffer_size(1)
            .fetch(&provider, &descriptor(), &destination, &NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Provider(_)));
        assert_eq!(tokio::fs::read(&destination).await.unwrap(), b"abc");
    }
}
