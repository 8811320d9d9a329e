//! The models used to represent sources, their streams and the work to be done.
//!
//! Stream descriptors are provider-agnostic: the yt-dlp provider maps its format list onto them,
//! and tests build them by hand.

use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub mod format_selector;

pub use format_selector::{StreamSelection, StreamSelector, VideoStrategy, select_streams};

/// The kind of artifact a work item produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// A video file, with its audio track.
    Video,
    /// An audio-only file.
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "video" => Ok(MediaKind::Video),
            "audio" => Ok(MediaKind::Audio),
            other => Err(format!("Unknown media kind: {}", other)),
        }
    }
}

/// The audio formats the transcoder can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// MPEG-1 Layer III, the default.
    #[default]
    Mp3,
    /// AAC in an MP4 container.
    M4a,
    /// Opus in an Ogg container.
    Opus,
    /// Vorbis in an Ogg container.
    Ogg,
    /// Free Lossless Audio Codec.
    Flac,
    /// Uncompressed PCM.
    Wav,
}

impl AudioFormat {
    /// Every supported format, in the order the CLI lists them.
    pub const ALL: [AudioFormat; 6] = [
        AudioFormat::Mp3,
        AudioFormat::Flac,
        AudioFormat::Ogg,
        AudioFormat::Opus,
        AudioFormat::M4a,
        AudioFormat::Wav,
    ];

    /// The file extension, also used as the container name.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Opus => "opus",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
        }
    }

    /// The ffmpeg encoder producing this format.
    pub fn codec(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "libmp3lame",
            AudioFormat::M4a => "aac",
            AudioFormat::Opus => "libopus",
            AudioFormat::Ogg => "libvorbis",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "pcm_s16le",
        }
    }

    /// Whether a target bitrate is meaningless for this format.
    pub fn is_lossless(&self) -> bool {
        matches!(self, AudioFormat::Flac | AudioFormat::Wav)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches('.').to_lowercase();
        AudioFormat::ALL
            .into_iter()
            .find(|format| format.extension() == s)
            .ok_or_else(|| format!("Unsupported audio format: {}", s))
    }
}

/// Provider-supplied metadata about one fetchable representation of a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// The provider's identifier of this stream, e.g. the yt-dlp format id '137'.
    pub id: String,
    /// The direct URL of the stream, when the provider exposes one.
    pub url: Option<String>,
    /// The container (file extension) of the stream, e.g. 'mp4', 'webm', 'm4a'.
    pub container: String,
    /// The MIME type, e.g. 'video/mp4'.
    pub mime_type: String,

    /// Whether the stream carries a video track.
    pub has_video: bool,
    /// Whether the stream carries an audio track.
    pub has_audio: bool,

    /// The vertical resolution in pixels.
    pub height: Option<u32>,
    /// The average bitrate in kbps.
    pub bitrate: Option<f64>,
    /// The declared size in bytes, possibly approximate.
    pub filesize: Option<u64>,
}

impl StreamDescriptor {
    /// Whether the stream already combines video and audio.
    pub fn is_progressive(&self) -> bool {
        self.has_video && self.has_audio
    }

    /// Whether the stream only carries video.
    pub fn is_video_only(&self) -> bool {
        self.has_video && !self.has_audio
    }

    /// Whether the stream only carries audio.
    pub fn is_audio_only(&self) -> bool {
        self.has_audio && !self.has_video
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stream(id={}, container={}", self.id, self.container)?;
        if let Some(height) = self.height {
            write!(f, ", {}p", height)?;
        }
        if let Some(bitrate) = self.bitrate {
            write!(f, ", {:.0}kbps", bitrate)?;
        }
        write!(f, ")")
    }
}

/// A source as listed by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// The provider's identifier of the source.
    pub id: String,
    /// The human title, not yet sanitized.
    pub title: String,
    /// The channel or uploader name, if known.
    pub uploader: Option<String>,
    /// Every stream the provider offers for this source.
    pub streams: Vec<StreamDescriptor>,
}

/// One entry of a playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Constructor)]
pub struct PlaylistEntry {
    /// The source reference of the entry.
    pub url: String,
    /// The title, when the listing provides one.
    pub title: Option<String>,
}

/// A named, ordered collection of sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    /// The title of the playlist.
    pub title: String,
    /// The entries, in playlist order.
    pub entries: Vec<PlaylistEntry>,
}

/// One request to acquire a single remote source into a local artifact.
#[derive(Debug, Clone, PartialEq, Eq, Constructor)]
pub struct WorkItem {
    /// The source reference, usually a URL.
    pub source: String,
    /// What to produce.
    pub kind: MediaKind,
    /// The directory the final artifact goes into.
    pub target_dir: PathBuf,
    /// The desired container of the final artifact, e.g. 'mp4' or 'mp3'.
    pub container: String,
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkItem({}, {} as {})", self.source, self.kind, self.container)
    }
}
