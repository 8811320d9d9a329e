//! Interactive questions asked on the terminal.
//!
//! The progress bars are suspended while a question is on screen.

use async_trait::async_trait;
use indicatif::MultiProgress;
use std::io::{self, BufRead, Write};
use std::path::Path;
use tubegrab_core::collision::{CollisionDecision, CollisionPolicy};
use tubegrab_core::model::Playlist;
use tubegrab_core::PlaylistSelection;

/// Asks on the terminal what to do with each file that already exists.
#[derive(Debug, Clone)]
pub struct PromptPolicy {
    multi: MultiProgress,
}

impl PromptPolicy {
    /// Creates a policy suspending the given bars while asking.
    pub fn new(multi: MultiProgress) -> Self {
        Self { multi }
    }
}

#[async_trait]
impl CollisionPolicy for PromptPolicy {
    async fn decide(&self, existing: &Path) -> CollisionDecision {
        let multi = self.multi.clone();
        let existing = existing.to_path_buf();

        let answer = tokio::task::spawn_blocking(move || {
            multi.suspend(|| {
                let stdin = io::stdin();
                let mut stdout = io::stdout();
                ask_collision(&mut stdin.lock(), &mut stdout, &existing)
            })
        })
        .await;

        match answer {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => {
                log::warn!("Could not read the answer, keeping the existing file: {}", e);
                CollisionDecision::Skip
            }
            Err(e) => {
                log::warn!("Prompt task failed, keeping the existing file: {}", e);
                CollisionDecision::Skip
            }
        }
    }
}

/// Asks until the answer is one of skip, rename or overwrite. An empty answer or end of input skips.
pub fn ask_collision(
    input: &mut impl BufRead,
    output: &mut impl Write,
    existing: &Path,
) -> io::Result<CollisionDecision> {
    let mut answer = String::new();
    loop {
        write!(
            output,
            "File {} already exists. [s]kip, [r]ename, [o]verwrite? ",
            existing.display()
        )?;
        output.flush()?;

        answer.clear();
        if input.read_line(&mut answer)? == 0 {
            return Ok(CollisionDecision::Skip);
        }

        match answer.trim().to_lowercase().as_str() {
            "" | "s" | "skip" => return Ok(CollisionDecision::Skip),
            "r" | "rename" => return Ok(CollisionDecision::Rename),
            "o" | "overwrite" => return Ok(CollisionDecision::Overwrite),
            other => writeln!(output, "Invalid choice: {}", other)?,
        }
    }
}

/// Lists the playlist entries and asks which ones to download, e.g. '1,3,5'.
/// An empty answer or end of input selects the entire playlist.
pub fn ask_selection(
    input: &mut impl BufRead,
    output: &mut impl Write,
    playlist: &Playlist,
) -> io::Result<PlaylistSelection> {
    writeln!(output, "Playlist: {}", playlist.title)?;
    for (index, entry) in playlist.entries.iter().enumerate() {
        writeln!(
            output,
            "{:>4}. {}",
            index + 1,
            entry.title.as_deref().unwrap_or(&entry.url)
        )?;
    }

    let mut answer = String::new();
    loop {
        write!(
            output,
            "Enter the numbers to download, separated by commas (empty for all): "
        )?;
        output.flush()?;

        answer.clear();
        if input.read_line(&mut answer)? == 0 {
            return Ok(PlaylistSelection::Entire);
        }

        match PlaylistSelection::parse(&answer) {
            Ok(selection) => return Ok(selection),
            Err(e) => writeln!(output, "{}", e)?,
        }
    }
}
