//! Decoding a finished artifact end to end to detect corruption.

use crate::error::{Error, Result};
use crate::transcoder::Transcoder;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// The result of one integrity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// The checked file.
    pub path: PathBuf,
    /// Every error the decoder reported, empty when the file is sound.
    pub errors: Vec<String>,
}

impl IntegrityReport {
    /// Whether the decoder reported nothing.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the transcoder in decode-only mode. The file is never modified.
#[derive(Debug, Clone)]
pub struct IntegrityChecker {
    transcoder: Transcoder,
}

impl IntegrityChecker {
    /// Creates a checker using the given transcoder.
    pub fn new(transcoder: Transcoder) -> Self {
        Self { transcoder }
    }

    /// Decodes the whole file, discarding the output, and collects the reported errors.
    ///
    /// # Errors
    ///
    /// Only failing to run the transcoder is an error; decode errors are part of the report.
    pub async fn check(&self, path: impl AsRef<Path>) -> Result<IntegrityReport> {
        let path = path.as_ref();
        let input = path
            .to_str()
            .ok_or_else(|| Error::Path(format!("Invalid path: {}", path.display())))?;

        let args = vec!["-v", "error", "-i", input, "-f", "null", "-"];
        let output = self.transcoder.command(args).run().await?;

        let mut errors: Vec<String> = output
            .stderr
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        if errors.is_empty() && !output.success() {
            errors.push(format!("Decoder exited with code {}", output.code));
        }

        if errors.is_empty() {
            log::debug!("Integrity check passed for {}", path.display());
        } else {
            log::warn!(
                "Integrity check found {} error(s) in {}",
                errors.len(),
                path.display()
            );
        }

        Ok(IntegrityReport {
            path: path.to_path_buf(),
            errors,
        })
    }
}
