//! Cumulative download counters, persisted as JSON next to the attempt history.

use crate::error::Result;
use crate::model::MediaKind;
use crate::utils::file_system;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// The name of the analytics file inside the log directory.
pub const ANALYTICS_FILE_NAME: &str = "download_analytics.json";

/// The counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadAnalytics {
    /// Every successful download.
    pub total_downloads: u64,
    /// The sum of the final artifact sizes, in bytes.
    pub total_bytes: u64,
    /// Successful video downloads.
    pub video_downloads: u64,
    /// Successful audio downloads.
    pub audio_downloads: u64,
}

impl DownloadAnalytics {
    /// Counts one successful download.
    pub fn add(&mut self, kind: MediaKind, bytes: u64) {
        self.total_downloads += 1;
        self.total_bytes += bytes;
        match kind {
            MediaKind::Video => self.video_downloads += 1,
            MediaKind::Audio => self.audio_downloads += 1,
        }
    }
}

impl fmt::Display for DownloadAnalytics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Download Analytics:")?;
        writeln!(f, "Total Downloads: {}", self.total_downloads)?;
        writeln!(
            f,
            "Total Data Downloaded: {:.2} MB",
            self.total_bytes as f64 / (1024.0 * 1024.0)
        )?;
        writeln!(f, "Video Downloads: {}", self.video_downloads)?;
        write!(f, "Audio Downloads: {}", self.audio_downloads)
    }
}

/// The analytics file, updated one download at a time.
#[derive(Debug)]
pub struct Analytics {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Analytics {
    /// Uses the analytics file inside `log_dir`; nothing is created until the first update.
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        Self {
            path: log_dir.as_ref().join(ANALYTICS_FILE_NAME),
            lock: Mutex::new(()),
        }
    }

    /// The path of the analytics file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the counters. A missing file reads as zeroes.
    ///
    /// # Errors
    ///
    /// This function will return an error if the file exists but cannot be read or parsed.
    pub async fn load(&self) -> Result<DownloadAnalytics> {
        read(&self.path).await
    }

    /// Counts one successful download and saves the counters.
    ///
    /// # Errors
    ///
    /// This function will return an error if the file cannot be read, parsed or written.
    pub async fn record(&self, kind: MediaKind, bytes: u64) -> Result<DownloadAnalytics> {
        let _guard = self.lock.lock().await;

        let mut analytics = read(&self.path).await?;
        analytics.add(kind, bytes);

        file_system::create_parent_dir(&self.path)?;
        let json = serde_json::to_string_pretty(&analytics)?;
        tokio::fs::write(&self.path, json).await?;

        log::debug!("Analytics updated: {:?}", analytics);
        Ok(analytics)
    }
}

async fn read(path: &Path) -> Result<DownloadAnalytics> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(DownloadAnalytics::default());
    }

    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}
