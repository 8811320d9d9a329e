//! Locating and invoking the external 'ffmpeg' transcoder.

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::utils;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// A located 'ffmpeg' executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcoder {
    /// The path to the executable.
    pub executable: PathBuf,
    /// The timeout of one invocation.
    pub timeout: Duration,
}

impl fmt::Display for Transcoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transcoder({})", self.executable.display())
    }
}

impl Transcoder {
    /// Creates a transcoder from a known executable path, with a 10 minutes timeout.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: Duration::from_secs(600),
        }
    }

    /// Finds 'ffmpeg', either at the given path or in `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TranscoderMissing`] if no executable can be found.
    pub fn locate(override_path: Option<PathBuf>) -> Result<Self> {
        let executable = match override_path {
            Some(path) if path.is_file() => path,
            Some(path) => return Err(Error::TranscoderMissing(path.display().to_string())),
            None => which::which(utils::find_executable("ffmpeg"))
                .map_err(|e| Error::TranscoderMissing(format!("ffmpeg: {}", e)))?,
        };

        log::debug!("Using ffmpeg at {}", executable.display());
        Ok(Self::new(executable))
    }

    /// Sets the timeout of one invocation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds an invocation with the given arguments.
    pub fn command(&self, args: Vec<&str>) -> Executor {
        Executor {
            executable_path: self.executable.clone(),
            timeout: self.timeout,
            args: utils::to_owned(args),
        }
    }
}
