//! The per-item acquisition pipeline and the types describing its configuration and results.
//!
//! One item goes through: list → select → fetch → assemble (merge or convert) → tag → commit, all inside
//! one retry attempt. Once the artifact is committed, the integrity check and the analytics update run
//! outside the retry loop, so they can never cause a second copy of the same artifact.

use crate::Downloader;
use crate::collision::Resolution;
use crate::error::{Error, Result};
use crate::history::{AttemptRecord, AttemptStatus};
use crate::integrity::IntegrityReport;
use crate::metadata::{self, AudioTags};
use crate::model::{
    AudioFormat, MediaKind, SourceInfo, StreamDescriptor, StreamSelection, VideoStrategy, WorkItem,
};
use crate::retry::{RetryCoordinator, RetryOutcome, RetryPolicy};
use crate::utils::file_system;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// How the items of a batch or playlist are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One item at a time, in input order.
    Sequential,
    /// Up to [`DownloaderConfig::max_concurrent`] items at once.
    #[default]
    Concurrent,
}

/// The configuration of a [`Downloader`].
#[derive(Debug, Clone, PartialEq)]
pub struct DownloaderConfig {
    /// How often one item is attempted.
    pub retry: RetryPolicy,
    /// How batch items are scheduled.
    pub mode: ExecutionMode,
    /// The maximum number of items in flight in concurrent mode.
    pub max_concurrent: usize,
    /// The format of audio items.
    pub audio_format: AudioFormat,
    /// The bitrate of lossy audio conversions, e.g. '192k'.
    pub audio_bitrate: String,
    /// The container of video items.
    pub video_container: String,
    /// How video streams are picked.
    pub video_strategy: VideoStrategy,
    /// Whether finished artifacts are decoded end to end.
    pub verify_integrity: bool,
    /// Whether MP3 artifacts get ID3 tags.
    pub tag_audio: bool,
    /// Where the attempt history and the analytics are written. Console-only when unset.
    pub history_dir: Option<PathBuf>,
    /// The timeout of one transcoder invocation.
    pub transcoder_timeout: Duration,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            mode: ExecutionMode::default(),
            max_concurrent: 4,
            audio_format: AudioFormat::default(),
            audio_bitrate: crate::assembler::DEFAULT_AUDIO_BITRATE.to_string(),
            video_container: "mp4".to_string(),
            video_strategy: VideoStrategy::default(),
            verify_integrity: true,
            tag_audio: true,
            history_dir: None,
            transcoder_timeout: Duration::from_secs(600),
        }
    }
}

impl DownloaderConfig {
    /// The container a work item of this kind is produced in.
    pub fn container_for(&self, kind: MediaKind) -> String {
        match kind {
            MediaKind::Video => self.video_container.clone(),
            MediaKind::Audio => self.audio_format.extension().to_string(),
        }
    }
}

/// Which entries of a playlist to download.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaylistSelection {
    /// Every entry.
    #[default]
    Entire,
    /// The entries at these 1-based positions, in this order.
    Indices(Vec<usize>),
}

impl PlaylistSelection {
    /// Parses a comma-separated list of 1-based positions, e.g. '1,3,5'.
    /// An empty input or 'all' selects the entire playlist.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first part that is not a number.
    pub fn parse(input: &str) -> std::result::Result<Self, String> {
        let input = input.trim();
        if input.is_empty() || input.eq_ignore_ascii_case("all") {
            return Ok(PlaylistSelection::Entire);
        }

        let mut indices = Vec::new();
        for part in input.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            let index = part
                .parse::<usize>()
                .map_err(|_| format!("Invalid playlist position: {}", part))?;
            if !indices.contains(&index) {
                indices.push(index);
            }
        }

        Ok(PlaylistSelection::Indices(indices))
    }

    /// Picks the selected entries. Out of range positions are ignored, and each entry is picked once.
    pub fn apply<'a, T>(&self, entries: &'a [T]) -> Vec<&'a T> {
        match self {
            PlaylistSelection::Entire => entries.iter().collect(),
            PlaylistSelection::Indices(indices) => {
                let mut seen = HashSet::new();
                indices
                    .iter()
                    .filter(|index| seen.insert(**index))
                    .filter_map(|index| index.checked_sub(1).and_then(|i| entries.get(i)))
                    .collect()
            }
        }
    }
}

impl FromStr for PlaylistSelection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        PlaylistSelection::parse(s)
    }
}

/// How one item ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ItemStatus {
    /// The artifact is in place.
    Success,
    /// The artifact already existed and was kept.
    Skipped,
    /// Every attempt failed, or the failure was permanent.
    Failed,
    /// The source refuses access.
    AccessRestricted,
    /// The work was cancelled.
    Interrupted,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::Success => write!(f, "Success"),
            ItemStatus::Skipped => write!(f, "Skipped"),
            ItemStatus::Failed => write!(f, "Failed"),
            ItemStatus::AccessRestricted => write!(f, "Access restricted"),
            ItemStatus::Interrupted => write!(f, "Interrupted"),
        }
    }
}

/// The result of one item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemReport {
    /// The source reference.
    pub source: String,
    /// How the item ended.
    pub status: ItemStatus,
    /// The final artifact, or the existing file kept in its place.
    pub path: Option<PathBuf>,
    /// The number of attempts made.
    pub attempts: u32,
    /// The integrity check of the artifact, when one ran.
    pub integrity: Option<IntegrityReport>,
    /// The last error, for failures.
    pub error: Option<String>,
}

impl ItemReport {
    fn new(source: &str, status: ItemStatus, attempts: u32) -> Self {
        Self {
            source: source.to_string(),
            status,
            path: None,
            attempts,
            integrity: None,
            error: None,
        }
    }

    fn failed(source: &str, attempts: u32, error: Error) -> Self {
        let status = match &error {
            Error::AccessRestricted(_) => ItemStatus::AccessRestricted,
            _ => ItemStatus::Failed,
        };

        Self {
            error: Some(error.to_string()),
            ..Self::new(source, status, attempts)
        }
    }
}

impl fmt::Display for ItemReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.status)?;
        if let Some(path) = &self.path {
            write!(f, " ({})", path.display())?;
        }
        if let Some(error) = &self.error {
            write!(f, " - {}", error)?;
        }
        Ok(())
    }
}

/// The results of a batch or playlist, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    /// One report per item.
    pub reports: Vec<ItemReport>,
}

impl BatchReport {
    /// The number of items that ended with the given status.
    pub fn count(&self, status: ItemStatus) -> usize {
        self.reports
            .iter()
            .filter(|report| report.status == status)
            .count()
    }

    /// Whether no item failed or was interrupted.
    pub fn is_success(&self) -> bool {
        self.reports
            .iter()
            .all(|report| matches!(report.status, ItemStatus::Success | ItemStatus::Skipped))
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloaded, {} skipped, {} failed, {} interrupted",
            self.count(ItemStatus::Success),
            self.count(ItemStatus::Skipped),
            self.count(ItemStatus::Failed) + self.count(ItemStatus::AccessRestricted),
            self.count(ItemStatus::Interrupted)
        )
    }
}

/// The names of the files one item goes through.
///
/// Temporaries carry the source id, so a retry reuses its own names and two items with the
/// same title never share them.
struct ArtifactNames {
    dir: PathBuf,
    title: String,
    id: String,
}

impl ArtifactNames {
    fn new(info: &SourceInfo, dir: &Path) -> Self {
        let id = file_system::sanitize_filename(&info.id);
        let title = file_system::sanitize_filename(&info.title);
        let title = if title.trim().is_empty() {
            id.clone()
        } else {
            title.trim().to_string()
        };

        Self {
            dir: dir.to_path_buf(),
            title,
            id,
        }
    }

    fn temporary(&self, track: &str, extension: &str) -> PathBuf {
        self.dir
            .join(format!("{} [{}]_{}.{}", self.title, self.id, track, extension))
    }

    fn staging(&self, extension: &str) -> PathBuf {
        self.dir
            .join(format!("{} [{}].part.{}", self.title, self.id, extension))
    }

    fn destination(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.title, extension))
    }
}

/// What one successful attempt left behind.
#[derive(Debug)]
struct Acquired {
    resolution: Resolution,
}

impl Acquired {
    fn status(&self) -> AttemptStatus {
        match self.resolution {
            Resolution::Placed(_) => AttemptStatus::Success,
            Resolution::Skipped(_) => AttemptStatus::Skipped,
        }
    }
}

impl Downloader {
    /// Runs one item to completion. Never fails: every outcome is a report.
    pub(crate) async fn run_item(&self, item: &WorkItem) -> ItemReport {
        if self.cancel.is_cancelled() {
            self.history
                .record(&AttemptRecord::new(
                    &item.source,
                    1,
                    AttemptStatus::Interrupted,
                    None,
                ))
                .await;
            return ItemReport::new(&item.source, ItemStatus::Interrupted, 0);
        }

        log::info!("Downloading {}", item);
        self.history
            .record(&AttemptRecord::new(
                &item.source,
                1,
                AttemptStatus::Started,
                None,
            ))
            .await;

        let mut coordinator = RetryCoordinator::new(
            self.config.retry,
            Arc::clone(&self.history),
            self.cancel.clone(),
        );
        let outcome = coordinator
            .run_with(&item.source, Acquired::status, |attempt| {
                self.acquire(item, attempt)
            })
            .await;

        match outcome {
            RetryOutcome::Succeeded { value, attempts } => {
                self.finish(item, value.resolution, attempts).await
            }
            RetryOutcome::Exhausted { attempts, error }
            | RetryOutcome::Rejected { attempts, error } => {
                ItemReport::failed(&item.source, attempts, error)
            }
            RetryOutcome::Interrupted { attempts } => {
                ItemReport::new(&item.source, ItemStatus::Interrupted, attempts)
            }
        }
    }

    /// One attempt, from listing to the committed artifact.
    async fn acquire(&self, item: &WorkItem, attempt: u32) -> Result<Acquired> {
        log::debug!("Attempt {} for {}", attempt, item);

        let info = self.provider.list_streams(&item.source).await?;
        let selection = self
            .selector
            .select(item.kind, &item.container, &info.streams)?;
        log::debug!("Selected {:?} for {}", selection.streams(), item.source);

        let names = ArtifactNames::new(&info, &item.target_dir);
        file_system::create_dir(&item.target_dir)?;

        let (staged, extension) = match selection {
            StreamSelection::Progressive(stream) => {
                let staging = names.staging(&stream.container);
                self.fetch(&stream, &staging).await?;
                (staging, stream.container)
            }
            StreamSelection::Split { video, audio } => {
                let video_path = names.temporary("video", &video.container);
                let audio_path = names.temporary("audio", &audio.container);
                tokio::try_join!(
                    self.fetch(&video, &video_path),
                    self.fetch(&audio, &audio_path)
                )?;

                let staging = names.staging(&item.container);
                self.assembler
                    .merge(&video_path, &audio_path, &staging)
                    .await?;
                (staging, item.container.clone())
            }
            StreamSelection::Audio {
                stream,
                needs_conversion: false,
            } => {
                let staging = names.staging(&stream.container);
                self.fetch(&stream, &staging).await?;
                (staging, stream.container)
            }
            StreamSelection::Audio {
                stream,
                needs_conversion: true,
            } => {
                let format = item.container.parse::<AudioFormat>().map_err(|_| {
                    Error::NoMatchingStream {
                        kind: item.kind,
                        container: item.container.clone(),
                    }
                })?;

                let input = names.temporary("audio", &stream.container);
                self.fetch(&stream, &input).await?;

                let staging = names.staging(format.extension());
                self.assembler
                    .convert(&input, &staging, format, &self.config.audio_bitrate)
                    .await?;
                (staging, format.extension().to_string())
            }
        };

        if self.config.tag_audio && item.kind == MediaKind::Audio && extension == "mp3" {
            self.tag(&staged, AudioTags::from_source(&info, &item.source))
                .await;
        }

        let destination = names.destination(&extension);
        let resolution = self.resolver.commit(&staged, &destination).await?;

        Ok(Acquired { resolution })
    }

    async fn fetch(&self, stream: &StreamDescriptor, destination: &Path) -> Result<u64> {
        self.fetcher
            .fetch(
                self.provider.as_ref(),
                stream,
                destination,
                self.progress.as_ref(),
            )
            .await
    }

    /// Tags are best effort: a file that cannot be tagged is still a valid download.
    async fn tag(&self, path: &Path, tags: AudioTags) {
        let target = path.to_path_buf();
        let tagged = tokio::task::spawn_blocking(move || metadata::tag_mp3(&target, &tags)).await;

        match tagged {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Failed to tag {}: {}", path.display(), e),
            Err(e) => log::warn!("Failed to tag {}: {}", path.display(), Error::from(e)),
        }
    }

    /// Post-commit steps of a successful item. Their failures are logged, never reported as item failures.
    async fn finish(&self, item: &WorkItem, resolution: Resolution, attempts: u32) -> ItemReport {
        let path = match resolution {
            Resolution::Skipped(existing) => {
                log::info!("Kept existing file {}", existing.display());
                return ItemReport {
                    path: Some(existing),
                    ..ItemReport::new(&item.source, ItemStatus::Skipped, attempts)
                };
            }
            Resolution::Placed(path) => path,
        };

        log::info!("Downloaded {} to {}", item.source, path.display());

        let integrity = if self.config.verify_integrity {
            // Dropping the check kills the decoder
            let checked = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    log::warn!("Interrupted the check of {}", path.display());
                    None
                }
                checked = self.checker.check(&path) => Some(checked),
            };

            match checked {
                Some(Ok(report)) => Some(report),
                Some(Err(e)) => {
                    log::warn!("Could not check {}: {}", path.display(), e);
                    None
                }
                None => None,
            }
        } else {
            None
        };

        if let Some(analytics) = &self.analytics {
            let counted = async {
                let bytes = tokio::fs::metadata(&path).await?.len();
                analytics.record(item.kind, bytes).await
            }
            .await;

            if let Err(e) = counted {
                log::warn!("Failed to update the download analytics: {}", e);
            }
        }

        ItemReport {
            path: Some(path),
            integrity,
            ..ItemReport::new(&item.source, ItemStatus::Success, attempts)
        }
    }
}
