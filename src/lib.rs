use log::info;
use regex::Regex;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tubegrab_core::error::Result;
use tubegrab_core::model::{MediaKind, Playlist};
use tubegrab_core::utils::file_system;
use tubegrab_core::{BatchReport, Downloader, PlaylistSelection};

pub mod config;
pub mod progress;
pub mod prompt;

const PLAYLIST_PATTERNS: [&str; 2] = [
    r"^https?://(www\.|m\.|music\.)?youtube\.com/playlist\?(.*&)?list=[\w-]+",
    r"^https?://(www\.|m\.)?youtube\.com/watch\?(.*&)?list=(PL|OL|UU|FL|RD)[\w-]+",
];

static PLAYLIST_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    PLAYLIST_PATTERNS
        .iter()
        .map(|pattern| Regex::new(pattern).unwrap())
        .collect()
});

/// The label of batch directories when none is given.
pub const DEFAULT_BATCH_LABEL: &str = "Batch";

/// Whether the reference points to a playlist rather than to a single source.
pub fn is_playlist_url(url: &str) -> bool {
    let url = url.trim();
    PLAYLIST_REGEXES.iter().any(|regex| regex.is_match(url))
}

/// Where single items of each kind are placed.
pub fn single_dir(download_dir: &Path, kind: MediaKind) -> PathBuf {
    match kind {
        MediaKind::Video => download_dir.join("Videos"),
        MediaKind::Audio => download_dir.join("Music"),
    }
}

/// Where the entries of a playlist are placed.
pub fn playlist_dir(download_dir: &Path, label: &str) -> PathBuf {
    download_dir.join("Playlists").join(label_or(label, "Playlist"))
}

/// Where the items of a batch are placed.
pub fn batch_dir(download_dir: &Path, label: Option<&str>) -> PathBuf {
    download_dir.join(label_or(label.unwrap_or_default(), DEFAULT_BATCH_LABEL))
}

fn label_or(label: &str, fallback: &str) -> String {
    let label = file_system::sanitize_filename(label);
    let label = label.trim();
    if label.is_empty() {
        fallback.to_string()
    } else {
        label.to_string()
    }
}

/// How the entries of a playlist are chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionInput {
    /// A selection given up front.
    Given(PlaylistSelection),
    /// Ask on the terminal once the entries are listed.
    Ask,
}

/// One invocation of the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The source references, usually URLs.
    pub sources: Vec<String>,
    /// What to produce.
    pub kind: MediaKind,
    /// The batch or playlist directory label.
    pub label: Option<String>,
    /// How playlist entries are chosen.
    pub selection: SelectionInput,
}

/// Reads source references from a list, one per line. Blank lines and lines starting with '#' are ignored.
pub fn read_sources(input: impl BufRead) -> io::Result<Vec<String>> {
    let mut sources = Vec::new();
    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() && !line.starts_with('#') {
            sources.push(line.to_string());
        }
    }
    Ok(sources)
}

/// Runs a request: one playlist, one item, or a batch, laid out under `download_dir`.
///
/// # Errors
///
/// This function will return an error only if a playlist cannot be listed.
/// Failures of single items are part of the report.
pub async fn run(
    downloader: &Downloader,
    download_dir: &Path,
    request: Request,
    multi: &indicatif::MultiProgress,
) -> Result<BatchReport> {
    let playlist_source = match request.sources.as_slice() {
        [source] if is_playlist_url(source) => Some(source.clone()),
        _ => None,
    };

    if let Some(source) = playlist_source {
        let playlist = downloader.list_playlist(&source).await?;
        let label = request.label.as_deref().unwrap_or(&playlist.title);
        let target_dir = playlist_dir(download_dir, label);

        let selection = match request.selection {
            SelectionInput::Given(selection) => selection,
            SelectionInput::Ask => ask_selection(&playlist, multi).await,
        };

        info!("Saving playlist to {}", target_dir.display());
        return Ok(downloader
            .download_entries(&playlist, request.kind, &target_dir, &selection)
            .await);
    }

    let target_dir = if request.sources.len() == 1 {
        single_dir(download_dir, request.kind)
    } else {
        batch_dir(download_dir, request.label.as_deref())
    };

    info!(
        "Saving {} item(s) to {}",
        request.sources.len(),
        target_dir.display()
    );
    Ok(downloader
        .download_batch(request.sources, request.kind, &target_dir)
        .await)
}

async fn ask_selection(playlist: &Playlist, multi: &indicatif::MultiProgress) -> PlaylistSelection {
    let playlist = playlist.clone();
    let multi = multi.clone();

    let answer = tokio::task::spawn_blocking(move || {
        multi.suspend(|| {
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            prompt::ask_selection(&mut stdin.lock(), &mut stdout, &playlist)
        })
    })
    .await;

    match answer {
        Ok(Ok(selection)) => selection,
        Ok(Err(e)) => {
            log::warn!("Could not read the selection, downloading everything: {}", e);
            PlaylistSelection::Entire
        }
        Err(e) => {
            log::warn!("Selection prompt failed, downloading everything: {}", e);
            PlaylistSelection::Entire
        }
    }
}
