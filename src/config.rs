//! The optional configuration file, `<config dir>/tubegrab/config.toml`.
//!
//! Every key is optional and command-line flags take precedence. A malformed file is reported and ignored.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The keys of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FileConfig {
    /// The root of the download layout.
    pub download_dir: Option<PathBuf>,
    /// Where the attempt history and the analytics are written.
    pub log_dir: Option<PathBuf>,
    /// The maximum number of attempts per item.
    pub retries: Option<u32>,
    /// The delay between two attempts, in seconds.
    pub retry_delay: Option<f64>,
    /// The number of items downloaded at once.
    pub concurrent_downloads: Option<usize>,
    /// Whether items are downloaded one at a time.
    pub sequential: Option<bool>,
    /// The audio format, e.g. 'mp3'.
    pub format: Option<String>,
    /// The bitrate of lossy audio conversions, e.g. '192k'.
    pub bitrate: Option<String>,
    /// The container of videos, e.g. 'mp4'.
    pub container: Option<String>,
    /// Whether finished files are decoded end to end.
    pub verify: Option<bool>,
    /// Whether MP3 files get ID3 tags.
    pub tags: Option<bool>,
    /// What to do with existing files: 'ask', 'skip', 'rename' or 'overwrite'.
    pub on_conflict: Option<String>,
    /// The path to 'ffmpeg'.
    pub ffmpeg: Option<PathBuf>,
    /// The path to 'yt-dlp'.
    pub yt_dlp: Option<PathBuf>,
    /// Extra arguments passed to every 'yt-dlp' invocation.
    pub yt_dlp_args: Vec<String>,
}

/// The default location of the configuration file.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tubegrab").join("config.toml"))
}

/// Loads the configuration file at its default location.
pub fn load() -> FileConfig {
    match default_path() {
        Some(path) => load_from(&path),
        None => {
            warn!("Could not find a valid config directory, using defaults.");
            FileConfig::default()
        }
    }
}

/// Loads a configuration file. A missing, empty or malformed file yields the defaults.
pub fn load_from(path: &Path) -> FileConfig {
    if !path.is_file() {
        debug!("No config file at {}", path.display());
        return FileConfig::default();
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Could not read config file {}: {}", path.display(), e);
            return FileConfig::default();
        }
    };

    match toml::from_str::<FileConfig>(&content) {
        Ok(config) => {
            debug!("Loaded config file {}", path.display());
            config
        }
        Err(e) => {
            warn!("Malformed config file {}: {}", path.display(), e);
            FileConfig::default()
        }
    }
}

/// The default root of the download layout: the user's download directory.
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("Downloads"))
}

/// The default directory of the attempt history and the analytics.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("tubegrab").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}
