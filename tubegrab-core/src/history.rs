//! The append-only attempt history, one line per attempt.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// The name of the history file inside the log directory.
pub const HISTORY_FILE_NAME: &str = "download_history.log";

/// How one attempt ended, or that an item started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AttemptStatus {
    /// The item was dispatched.
    Started,
    /// The attempt produced the artifact.
    Success,
    /// The attempt failed and may be retried.
    Failed,
    /// The source refuses access; never retried.
    FailedAccessRestricted,
    /// The work was cancelled from outside.
    Interrupted,
    /// The artifact already existed and the caller kept it.
    Skipped,
}

/// One line of the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// The source reference.
    pub source: String,
    /// The 1-based attempt number.
    pub attempt: u32,
    /// How the attempt ended.
    pub status: AttemptStatus,
    /// The error detail, for failures.
    pub error: Option<String>,
    /// When the record was made.
    pub timestamp: DateTime<Local>,
}

impl AttemptRecord {
    /// Creates a record stamped with the current local time.
    pub fn new(
        source: impl Into<String>,
        attempt: u32,
        status: AttemptStatus,
        error: Option<String>,
    ) -> Self {
        Self {
            source: source.into(),
            attempt,
            status,
            error,
            timestamp: Local::now(),
        }
    }
}

impl fmt::Display for AttemptRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] URL: {}, Status: ",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.source
        )?;

        match self.status {
            AttemptStatus::Started => write!(f, "Started")?,
            AttemptStatus::Success => write!(f, "Success")?,
            AttemptStatus::Failed => write!(f, "Failed - Attempt {}", self.attempt)?,
            AttemptStatus::FailedAccessRestricted => write!(f, "Failed - Age Restricted")?,
            AttemptStatus::Interrupted => write!(f, "Interrupted")?,
            AttemptStatus::Skipped => write!(f, "Skipped")?,
        }

        if let Some(error) = &self.error {
            // One record is one line
            let detail = error.lines().map(str::trim).collect::<Vec<_>>().join(" ");
            write!(f, ", Error: {}", detail)?;
        }

        Ok(())
    }
}

/// The shared attempt history.
///
/// Appends are serialized, so concurrent items never interleave within a line.
/// When the log directory cannot be created the history is console-only.
#[derive(Debug)]
pub struct History {
    path: Option<PathBuf>,
    file: Option<Mutex<tokio::fs::File>>,
}

impl History {
    /// Opens (or creates) the history file inside `log_dir`.
    ///
    /// Never fails: if the directory or the file cannot be created, a warning is printed and
    /// the returned history only logs to the console.
    pub async fn open(log_dir: impl AsRef<Path>) -> Self {
        let log_dir = log_dir.as_ref();
        let path = log_dir.join(HISTORY_FILE_NAME);

        let opened = async {
            tokio::fs::create_dir_all(log_dir).await?;
            tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
        }
        .await;

        match opened {
            Ok(file) => {
                log::debug!("Recording attempt history in {}", path.display());
                Self {
                    path: Some(path),
                    file: Some(Mutex::new(file)),
                }
            }
            Err(e) => {
                log::warn!(
                    "Failed to open {}, attempt history will only be printed: {}",
                    path.display(),
                    e
                );
                Self::console_only()
            }
        }
    }

    /// A history that only logs to the console.
    pub fn console_only() -> Self {
        Self {
            path: None,
            file: None,
        }
    }

    /// The path of the history file, if one is open.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends one record.
    pub async fn record(&self, record: &AttemptRecord) {
        let line = record.to_string();
        log::debug!("{}", line);

        let Some(file) = &self.file else {
            return;
        };

        let mut file = file.lock().await;
        let written = async {
            file.write_all(format!("{}\n", line).as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            log::warn!("Failed to append to the attempt history: {}", e);
        }
    }
}
