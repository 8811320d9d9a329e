#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tubegrab_core::error::{Error, Result};
use tubegrab_core::model::{Playlist, PlaylistEntry, SourceInfo, StreamDescriptor};
use tubegrab_core::provider::{StreamProvider, Transfer};

/// How a fake source answers listings.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Lists normally.
    Available,
    /// Fails with a provider error this many times, then lists normally.
    FlakyFor(u32),
    /// Always refuses access.
    Restricted,
}

#[derive(Debug, Clone)]
struct FakeSource {
    info: SourceInfo,
    behavior: Behavior,
}

/// An in-memory catalogue. Every stream transfers the bytes '<stream id>-bytes'.
#[derive(Debug, Default)]
pub struct FakeProvider {
    sources: HashMap<String, FakeSource>,
    playlists: HashMap<String, Playlist>,
    listings: Mutex<HashMap<String, u32>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(
        mut self,
        url: &str,
        title: &str,
        streams: Vec<StreamDescriptor>,
        behavior: Behavior,
    ) -> Self {
        let info = SourceInfo {
            id: url.rsplit('/').next().unwrap_or(url).to_string(),
            title: title.to_string(),
            uploader: Some("Uploader".to_string()),
            streams,
        };
        self.sources
            .insert(url.to_string(), FakeSource { info, behavior });
        self
    }

    pub fn with_playlist(mut self, url: &str, title: &str, entries: &[&str]) -> Self {
        let playlist = Playlist {
            title: title.to_string(),
            entries: entries
                .iter()
                .map(|entry| PlaylistEntry::new(entry.to_string(), None))
                .collect(),
        };
        self.playlists.insert(url.to_string(), playlist);
        self
    }

    /// How many times the source was listed.
    pub fn listings(&self, url: &str) -> u32 {
        self.listings
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl StreamProvider for FakeProvider {
    async fn list_streams(&self, source: &str) -> Result<SourceInfo> {
        let count = {
            let mut listings = self.listings.lock().unwrap();
            let count = listings.entry(source.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let fake = self
            .sources
            .get(source)
            .ok_or_else(|| Error::Provider(format!("Unknown source {}", source)))?;

        match fake.behavior {
            Behavior::Available => Ok(fake.info.clone()),
            Behavior::FlakyFor(failures) if count <= failures => {
                Err(Error::Provider("HTTP Error 503: Service Unavailable".to_string()))
            }
            Behavior::FlakyFor(_) => Ok(fake.info.clone()),
            Behavior::Restricted => Err(Error::AccessRestricted(
                "Sign in to confirm your age".to_string(),
            )),
        }
    }

    async fn list_playlist(&self, source: &str) -> Result<Playlist> {
        self.playlists
            .get(source)
            .cloned()
            .ok_or_else(|| Error::Provider(format!("Unknown playlist {}", source)))
    }

    async fn open_transfer(&self, stream: &StreamDescriptor) -> Result<Transfer> {
        let bytes = format!("{}-bytes", stream.id).into_bytes();
        let (first, second) = bytes.split_at(bytes.len() / 2);

        Ok(Transfer {
            total: Some(bytes.len() as u64),
            stream: Box::pin(futures_util::stream::iter(vec![
                Ok(first.to_vec()),
                Ok(second.to_vec()),
            ])),
        })
    }
}

pub fn audio_stream(id: &str, container: &str, bitrate: f64) -> StreamDescriptor {
    StreamDescriptor {
        id: id.to_string(),
        url: None,
        container: container.to_string(),
        mime_type: format!("audio/{}", container),
        has_video: false,
        has_audio: true,
        height: None,
        bitrate: Some(bitrate),
        filesize: None,
    }
}

pub fn video_stream(id: &str, container: &str, height: u32) -> StreamDescriptor {
    StreamDescriptor {
        id: id.to_string(),
        url: None,
        container: container.to_string(),
        mime_type: format!("video/{}", container),
        has_video: true,
        has_audio: false,
        height: Some(height),
        bitrate: Some(f64::from(height) * 4.0),
        filesize: None,
    }
}

/// A fake 'ffmpeg' writing `content` to its output argument. Decode-only checks (output '-') print nothing.
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path, content: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("ffmpeg");
    let script = format!(
        "#!/bin/sh\nfor last; do :; done\nif [ \"$last\" != \"-\" ]; then printf '%s' '{}' > \"$last\"; fi\nexit 0\n",
        content
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Like [`fake_ffmpeg`], but decoding to '-' takes `check_secs` seconds.
#[cfg(unix)]
pub fn slow_check_ffmpeg(dir: &Path, content: &str, check_secs: u32) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("ffmpeg");
    let script = format!(
        "#!/bin/sh\nfor last; do :; done\nif [ \"$last\" = \"-\" ]; then exec sleep {}; fi\nprintf '%s' '{}' > \"$last\"\n",
        check_secs, content
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// The statuses of the history file, in order.
pub fn statuses(log_dir: &Path) -> Vec<String> {
    std::fs::read_to_string(log_dir.join(tubegrab_core::history::HISTORY_FILE_NAME))
        .unwrap()
        .lines()
        .map(|line| {
            let status = line.split("Status: ").nth(1).unwrap();
            status.split(", Error").next().unwrap().to_string()
        })
        .collect()
}

/// The file names inside a directory, sorted.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
