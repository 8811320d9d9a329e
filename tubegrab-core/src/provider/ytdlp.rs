//! A stream provider backed by the 'yt-dlp' executable.

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::model::{Playlist, PlaylistEntry, SourceInfo, StreamDescriptor};
use crate::provider::{StreamProvider, Transfer, http_transfer};
use crate::utils;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

/// Error output of yt-dlp meaning the source cannot be fetched whatever the number of attempts.
static ACCESS_RESTRICTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(sign in to confirm your age|age[- ]restricted|inappropriate for some users|members[- ]only|join this channel|private video|video is private|sign in if you've been granted access)",
    )
    .unwrap()
});

/// Lists sources through 'yt-dlp' and transfers their streams over HTTP.
#[derive(Debug, Clone)]
pub struct YtDlpProvider {
    /// The path to the 'yt-dlp' executable.
    pub executable: PathBuf,
    /// The timeout of one listing.
    pub timeout: Duration,
    /// Extra arguments passed before every invocation.
    pub args: Vec<String>,

    client: reqwest::Client,
}

impl YtDlpProvider {
    /// Creates a provider using the given executable.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: Duration::from_secs(60),
            args: Vec::new(),
            client: reqwest::Client::new(),
        }
    }

    /// Finds 'yt-dlp', either at the given path or in `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProviderMissing`] if no executable can be found.
    pub fn locate(override_path: Option<PathBuf>) -> Result<Self> {
        let executable = match override_path {
            Some(path) if path.is_file() => path,
            Some(path) => return Err(Error::ProviderMissing(path.display().to_string())),
            None => which::which(utils::find_executable("yt-dlp"))
                .map_err(|e| Error::ProviderMissing(format!("yt-dlp: {}", e)))?,
        };

        log::debug!("Using yt-dlp at {}", executable.display());
        Ok(Self::new(executable))
    }

    /// Sets the timeout of one listing.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds arguments passed to every invocation, e.g. '--cookies-from-browser firefox'.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args.extend(args);
        self
    }

    async fn dump(&self, args: Vec<&str>) -> Result<String> {
        let mut final_args = self.args.clone();
        final_args.append(&mut utils::to_owned(args));

        let executor = Executor {
            executable_path: self.executable.clone(),
            timeout: self.timeout,
            args: final_args,
        };

        let output = executor.run().await?;
        if !output.success() {
            return Err(classify_failure(&output.stderr));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl StreamProvider for YtDlpProvider {
    async fn list_streams(&self, source: &str) -> Result<SourceInfo> {
        let stdout = self
            .dump(vec!["--no-progress", "--no-playlist", "--dump-json", source])
            .await?;

        parse_source(&stdout)
    }

    async fn list_playlist(&self, source: &str) -> Result<Playlist> {
        let stdout = self
            .dump(vec!["--flat-playlist", "--dump-single-json", source])
            .await?;

        parse_playlist(&stdout)
    }

    async fn open_transfer(&self, stream: &StreamDescriptor) -> Result<Transfer> {
        let url = stream
            .url
            .as_deref()
            .ok_or_else(|| Error::Provider(format!("Stream {} has no direct URL", stream.id)))?;

        http_transfer(&self.client, url).await
    }
}

/// Maps yt-dlp error output to an error.
pub fn classify_failure(stderr: &str) -> Error {
    let detail = stderr
        .lines()
        .rev()
        .find(|line| line.contains("ERROR"))
        .or_else(|| stderr.lines().rev().find(|line| !line.trim().is_empty()))
        .unwrap_or("yt-dlp exited without output")
        .trim()
        .to_string();

    // Warnings may mention a restriction that is not the cause of the failure
    if ACCESS_RESTRICTED.is_match(&detail) {
        Error::AccessRestricted(detail)
    } else {
        Error::Provider(detail)
    }
}

#[derive(Debug, Deserialize)]
struct RawSource {
    id: String,
    title: String,
    uploader: Option<String>,
    channel: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: String,
    url: Option<String>,
    ext: String,
    protocol: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    tbr: Option<f64>,
    abr: Option<f64>,
    filesize: Option<u64>,
    filesize_approx: Option<f64>,
}

impl RawFormat {
    /// Only formats fetchable with one GET request are kept.
    fn is_direct(&self) -> bool {
        self.url.is_some()
            && self
                .protocol
                .as_deref()
                .is_some_and(|protocol| protocol == "https" || protocol == "http")
    }

    fn into_descriptor(self) -> StreamDescriptor {
        let has_codec = |codec: &Option<String>| codec.as_deref().is_some_and(|c| c != "none");
        let has_video = has_codec(&self.vcodec);
        let has_audio = has_codec(&self.acodec);

        let bitrate = if has_video { self.tbr } else { self.abr.or(self.tbr) };
        let filesize = self
            .filesize
            .or(self.filesize_approx.map(|size| size as u64));
        let mime_type = format!("{}/{}", if has_video { "video" } else { "audio" }, self.ext);

        StreamDescriptor {
            id: self.format_id,
            url: self.url,
            container: self.ext,
            mime_type,
            has_video,
            has_audio,
            height: self.height,
            bitrate,
            filesize,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPlaylist {
    title: Option<String>,
    #[serde(default)]
    entries: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    id: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    title: Option<String>,
}

fn parse_source(json: &str) -> Result<SourceInfo> {
    let raw: RawSource = serde_json::from_str(json)?;

    let total = raw.formats.len();
    let streams: Vec<StreamDescriptor> = raw
        .formats
        .into_iter()
        .filter(RawFormat::is_direct)
        .map(RawFormat::into_descriptor)
        .collect();

    log::debug!(
        "Source {} lists {} formats, {} directly fetchable",
        raw.id,
        total,
        streams.len()
    );

    Ok(SourceInfo {
        id: raw.id,
        title: raw.title,
        uploader: raw.uploader.or(raw.channel),
        streams,
    })
}

fn parse_playlist(json: &str) -> Result<Playlist> {
    let raw: RawPlaylist = serde_json::from_str(json)?;

    let entries = raw
        .entries
        .into_iter()
        .filter_map(|entry| {
            let url = entry.url.or(entry.webpage_url).or_else(|| {
                entry
                    .id
                    .map(|id| format!("https://www.youtube.com/watch?v={}", id))
            })?;
            Some(PlaylistEntry::new(url, entry.title))
        })
        .collect();

    Ok(Playlist {
        title: raw.title.unwrap_or_else(|| "Playlist".to_string()),
        entries,
    })
}
