//! Stream selection policies for video and audio work items.

use crate::error::{Error, Result};
use crate::model::{MediaKind, StreamDescriptor};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How a video work item is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VideoStrategy {
    /// Use a combined stream in the desired container when one exists.
    PreferProgressive,
    /// Fetch the best video-only and audio-only streams and merge them.
    #[default]
    Split,
}

/// The streams chosen for one work item.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSelection {
    /// One stream carrying both tracks, used as-is.
    Progressive(StreamDescriptor),
    /// Separate tracks to be merged.
    Split {
        /// The video-only stream.
        video: StreamDescriptor,
        /// The audio-only stream.
        audio: StreamDescriptor,
    },
    /// One stream carrying audio.
    Audio {
        /// The selected stream.
        stream: StreamDescriptor,
        /// Whether the stream must be converted to reach the target format.
        needs_conversion: bool,
    },
}

impl StreamSelection {
    /// The selected streams, video first.
    pub fn streams(&self) -> Vec<&StreamDescriptor> {
        match self {
            StreamSelection::Progressive(stream) => vec![stream],
            StreamSelection::Split { video, audio } => vec![video, audio],
            StreamSelection::Audio { stream, .. } => vec![stream],
        }
    }
}

/// Picks streams for a work item according to a [`VideoStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamSelector {
    strategy: VideoStrategy,
}

impl StreamSelector {
    /// Creates a selector using the given video strategy.
    pub fn new(strategy: VideoStrategy) -> Self {
        Self { strategy }
    }

    /// Selects the streams to fetch.
    ///
    /// # Arguments
    ///
    /// * `kind` - What the work item produces.
    /// * `container` - The desired container, e.g. 'mp4' for video or 'mp3' for audio.
    /// * `streams` - Every stream the provider listed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMatchingStream`] when nothing carries the required tracks.
    pub fn select(
        &self,
        kind: MediaKind,
        container: &str,
        streams: &[StreamDescriptor],
    ) -> Result<StreamSelection> {
        log::debug!(
            "Selecting {} streams for container '{}' among {} candidates",
            kind,
            container,
            streams.len()
        );

        let selection = match kind {
            MediaKind::Video => self.select_video(container, streams),
            MediaKind::Audio => select_audio(container, streams),
        };

        selection.ok_or_else(|| Error::NoMatchingStream {
            kind,
            container: container.to_string(),
        })
    }

    fn select_video(
        &self,
        container: &str,
        streams: &[StreamDescriptor],
    ) -> Option<StreamSelection> {
        let best_progressive = || {
            best_by(
                streams
                    .iter()
                    .filter(|s| s.is_progressive() && matches_container(s, container)),
                compare_video,
            )
        };

        if self.strategy == VideoStrategy::PreferProgressive {
            if let Some(stream) = best_progressive() {
                return Some(StreamSelection::Progressive(stream.clone()));
            }
        }

        let video_only = || streams.iter().filter(|s| s.is_video_only());
        let video = best_by(
            video_only().filter(|s| matches_container(s, container)),
            compare_video,
        )
        .or_else(|| best_by(video_only(), compare_video));

        let audio_container = companion_audio_container(container);
        let audio_only = || streams.iter().filter(|s| s.is_audio_only());
        let audio = best_by(
            audio_only().filter(|s| matches_container(s, audio_container)),
            compare_audio,
        )
        .or_else(|| best_by(audio_only(), compare_audio));

        if let (Some(video), Some(audio)) = (video, audio) {
            return Some(StreamSelection::Split {
                video: video.clone(),
                audio: audio.clone(),
            });
        }

        // Without both halves, a combined stream is the only way to get a playable file.
        best_progressive()
            .or_else(|| best_by(streams.iter().filter(|s| s.is_progressive()), compare_video))
            .map(|stream| StreamSelection::Progressive(stream.clone()))
    }
}

/// Selects streams with the default [`VideoStrategy`].
pub fn select_streams(
    kind: MediaKind,
    container: &str,
    streams: &[StreamDescriptor],
) -> Result<StreamSelection> {
    StreamSelector::default().select(kind, container, streams)
}

fn select_audio(container: &str, streams: &[StreamDescriptor]) -> Option<StreamSelection> {
    let audio_only = || streams.iter().filter(|s| s.is_audio_only());

    if let Some(stream) = best_by(
        audio_only().filter(|s| matches_container(s, container)),
        compare_audio,
    ) {
        return Some(StreamSelection::Audio {
            stream: stream.clone(),
            needs_conversion: false,
        });
    }

    best_by(audio_only(), compare_audio)
        .or_else(|| best_by(streams.iter().filter(|s| s.has_audio), compare_audio))
        .map(|stream| StreamSelection::Audio {
            stream: stream.clone(),
            needs_conversion: true,
        })
}

fn matches_container(stream: &StreamDescriptor, container: &str) -> bool {
    stream.container.eq_ignore_ascii_case(container)
}

/// The audio container that can be stream-copied next to a video container.
fn companion_audio_container(video_container: &str) -> &str {
    match video_container {
        "mp4" | "mov" => "m4a",
        other => other,
    }
}

fn best_by<'a>(
    streams: impl Iterator<Item = &'a StreamDescriptor>,
    compare: fn(&StreamDescriptor, &StreamDescriptor) -> Ordering,
) -> Option<&'a StreamDescriptor> {
    streams.max_by(|a, b| compare(a, b))
}

/// Resolution, then bitrate, then declared size, then the smallest id.
fn compare_video(a: &StreamDescriptor, b: &StreamDescriptor) -> Ordering {
    a.height
        .unwrap_or(0)
        .cmp(&b.height.unwrap_or(0))
        .then_with(|| compare_bitrate(a, b))
        .then_with(|| tie_break(a, b))
}

/// Bitrate, then declared size, then the smallest id.
fn compare_audio(a: &StreamDescriptor, b: &StreamDescriptor) -> Ordering {
    compare_bitrate(a, b).then_with(|| tie_break(a, b))
}

fn compare_bitrate(a: &StreamDescriptor, b: &StreamDescriptor) -> Ordering {
    OrderedFloat(a.bitrate.unwrap_or(0.0)).cmp(&OrderedFloat(b.bitrate.unwrap_or(0.0)))
}

fn tie_break(a: &StreamDescriptor, b: &StreamDescriptor) -> Ordering {
    a.filesize
        .unwrap_or(0)
        .cmp(&b.filesize.unwrap_or(0))
        .then_with(|| b.id.cmp(&a.id))
}
