#![doc = include_str!("../README.md")]

use crate::analytics::Analytics;
use crate::assembler::Assembler;
use crate::collision::{CollisionDecision, CollisionPolicy, CollisionResolver};
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::fetcher::progress::{NoProgress, ProgressReporter};
use crate::history::History;
use crate::integrity::IntegrityChecker;
use crate::model::{MediaKind, Playlist, StreamSelector, WorkItem};
use crate::provider::StreamProvider;
use crate::transcoder::Transcoder;
use futures_util::StreamExt;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod analytics;
pub mod assembler;
pub mod collision;
pub mod error;
pub mod executor;
pub mod fetcher;
pub mod history;
pub mod integrity;
pub mod metadata;
pub mod model;
pub mod orchestrator;
pub mod provider;
pub mod retry;
pub mod transcoder;
pub mod utils;

#[cfg(all(test, unix))]
mod testing;

pub use orchestrator::{
    BatchReport, DownloaderConfig, ExecutionMode, ItemReport, ItemStatus, PlaylistSelection,
};

/// Acquires sources into local artifacts: single items, batches and playlists.
///
/// Every item runs under its own retry loop, and no item's failure reaches its siblings.
/// The attempt history, the collision policy and the progress display are shared by all items.
///
/// # Examples
///
/// ```rust, no_run
/// # use tubegrab_core::Downloader;
/// # use tubegrab_core::model::MediaKind;
/// # use tubegrab_core::provider::YtDlpProvider;
/// # use tubegrab_core::transcoder::Transcoder;
/// # use std::path::PathBuf;
/// # use std::sync::Arc;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = YtDlpProvider::locate(None)?;
/// let transcoder = Transcoder::locate(None)?;
///
/// let downloader = Downloader::builder(Arc::new(provider), transcoder)
///     .build()
///     .await;
///
/// let sources = vec![String::from("https://www.youtube.com/watch?v=dQw4w9WgXcQ")];
/// let report = downloader
///     .download_batch(sources, MediaKind::Audio, PathBuf::from("Music"))
///     .await;
/// println!("{}", report);
/// # Ok(())
/// # }
/// ```
pub struct Downloader {
    pub(crate) provider: Arc<dyn StreamProvider>,
    pub(crate) config: DownloaderConfig,
    pub(crate) selector: StreamSelector,
    pub(crate) fetcher: Fetcher,
    pub(crate) assembler: Assembler,
    pub(crate) checker: IntegrityChecker,
    pub(crate) resolver: CollisionResolver,
    pub(crate) history: Arc<History>,
    pub(crate) analytics: Option<Analytics>,
    pub(crate) progress: Arc<dyn ProgressReporter>,
    pub(crate) cancel: CancellationToken,
}

impl fmt::Display for Downloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Downloader: mode={:?}, max_concurrent={}, history={:?}",
            self.config.mode,
            self.config.max_concurrent,
            self.history.path()
        )
    }
}

impl Downloader {
    /// Starts building a downloader.
    ///
    /// # Arguments
    ///
    /// * `provider` - Lists sources and transfers their streams.
    /// * `transcoder` - The located 'ffmpeg', see [`Transcoder::locate`].
    pub fn builder(provider: Arc<dyn StreamProvider>, transcoder: Transcoder) -> DownloaderBuilder {
        DownloaderBuilder {
            provider,
            transcoder,
            config: DownloaderConfig::default(),
            policy: Arc::new(CollisionDecision::Rename),
            progress: Arc::new(NoProgress),
            cancel: CancellationToken::new(),
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// The shared attempt history.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// The analytics file, when a history directory is configured.
    pub fn analytics(&self) -> Option<&Analytics> {
        self.analytics.as_ref()
    }

    /// The token stopping every item. Cancelling it records the remaining items as interrupted.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Acquires one item, retrying it according to the policy.
    pub async fn download_single(&self, item: &WorkItem) -> ItemReport {
        self.run_item(item).await
    }

    /// Acquires every source into `target_dir`, as independent items of the given kind.
    pub async fn download_batch(
        &self,
        sources: Vec<String>,
        kind: MediaKind,
        target_dir: impl AsRef<Path>,
    ) -> BatchReport {
        let container = self.config.container_for(kind);
        let items = sources
            .into_iter()
            .map(|source| {
                WorkItem::new(
                    source,
                    kind,
                    target_dir.as_ref().to_path_buf(),
                    container.clone(),
                )
            })
            .collect();

        self.download_items(items).await
    }

    /// Acquires the given items, sequentially or through a bounded pool depending on the configuration.
    /// The reports come back in input order.
    pub async fn download_items(&self, items: Vec<WorkItem>) -> BatchReport {
        log::debug!(
            "Dispatching {} items in {:?} mode",
            items.len(),
            self.config.mode
        );

        let reports = match self.config.mode {
            ExecutionMode::Sequential => {
                let mut reports = Vec::with_capacity(items.len());
                for item in &items {
                    reports.push(self.run_item(item).await);
                }
                reports
            }
            ExecutionMode::Concurrent => {
                let mut indexed: Vec<(usize, ItemReport)> =
                    futures_util::stream::iter(items.iter().enumerate())
                        .map(|(index, item)| async move { (index, self.run_item(item).await) })
                        .buffer_unordered(self.config.max_concurrent.max(1))
                        .collect()
                        .await;

                indexed.sort_by_key(|(index, _)| *index);
                indexed.into_iter().map(|(_, report)| report).collect()
            }
        };

        let report = BatchReport { reports };
        log::info!("{}", report);
        report
    }

    /// Lists the entries of a playlist.
    ///
    /// # Errors
    ///
    /// This function will return an error if the provider cannot list the playlist.
    pub async fn list_playlist(&self, source: &str) -> Result<Playlist> {
        let playlist = self.provider.list_playlist(source).await?;
        log::info!(
            "Playlist '{}' has {} entries",
            playlist.title,
            playlist.entries.len()
        );
        Ok(playlist)
    }

    /// Lists a playlist and acquires the selected entries into `target_dir`.
    ///
    /// # Errors
    ///
    /// This function will return an error if the provider cannot list the playlist.
    /// Failures of single entries are part of the report.
    pub async fn download_playlist(
        &self,
        source: &str,
        kind: MediaKind,
        target_dir: impl AsRef<Path>,
        selection: &PlaylistSelection,
    ) -> Result<BatchReport> {
        let playlist = self.list_playlist(source).await?;
        Ok(self
            .download_entries(&playlist, kind, target_dir, selection)
            .await)
    }

    /// Acquires the selected entries of an already listed playlist into `target_dir`.
    pub async fn download_entries(
        &self,
        playlist: &Playlist,
        kind: MediaKind,
        target_dir: impl AsRef<Path>,
        selection: &PlaylistSelection,
    ) -> BatchReport {
        let sources: Vec<String> = selection
            .apply(&playlist.entries)
            .into_iter()
            .map(|entry| entry.url.clone())
            .collect();

        log::info!(
            "Downloading {} of {} entries of '{}'",
            sources.len(),
            playlist.entries.len(),
            playlist.title
        );
        self.download_batch(sources, kind, target_dir).await
    }
}

/// Builds a [`Downloader`].
pub struct DownloaderBuilder {
    provider: Arc<dyn StreamProvider>,
    transcoder: Transcoder,
    config: DownloaderConfig,
    policy: Arc<dyn CollisionPolicy>,
    progress: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

impl DownloaderBuilder {
    /// Sets the configuration.
    pub fn config(mut self, config: DownloaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets what happens when a final path is already taken. Defaults to [`CollisionDecision::Rename`].
    pub fn collision_policy(mut self, policy: Arc<dyn CollisionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the progress display. Defaults to [`NoProgress`].
    pub fn progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Uses an existing cancellation token, e.g. one wired to Ctrl-C.
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Opens the attempt history and assembles the downloader.
    ///
    /// An unusable history directory only downgrades the history to console output.
    pub async fn build(self) -> Downloader {
        let history = match &self.config.history_dir {
            Some(dir) => History::open(dir).await,
            None => History::console_only(),
        };
        let analytics = self.config.history_dir.as_ref().map(Analytics::new);
        let transcoder = self
            .transcoder
            .with_timeout(self.config.transcoder_timeout);

        Downloader {
            provider: self.provider,
            selector: StreamSelector::new(self.config.video_strategy),
            fetcher: Fetcher::new(),
            assembler: Assembler::new(transcoder.clone()),
            checker: IntegrityChecker::new(transcoder),
            resolver: CollisionResolver::new(self.policy),
            history: Arc::new(history),
            analytics,
            progress: self.progress,
            cancel: self.cancel,
            config: self.config,
        }
    }
}
