//! Subprocess execution for the external tools, 'yt-dlp' and 'ffmpeg'.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// One invocation of an external tool, bounded by a timeout.
///
/// # Example
///
/// ```rust,no_run
/// # use tubegrab_core::utils;
/// # use std::path::PathBuf;
/// # use std::time::Duration;
/// # use tubegrab_core::executor::Executor;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let executor = Executor {
///     executable_path: PathBuf::from("ffmpeg"),
///     timeout: Duration::from_secs(30),
///     args: utils::to_owned(vec!["-hide_banner", "-version"]),
/// };
///
/// let output = executor.execute().await?;
/// println!("{}", output.stdout.lines().next().unwrap_or_default());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Executor {
    pub executable_path: PathBuf,
    /// The process is killed once this elapses.
    pub timeout: Duration,

    pub args: Vec<String>,
}

/// What a finished process printed, and how it exited.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// The exit code, or -1 when the process was ended by a signal.
    pub code: i32,
}

impl ProcessOutput {
    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        self.code == 0
    }

    fn into_failure(self) -> Error {
        Error::Command(format!(
            "Process failed with code {}: {}",
            self.code,
            self.stderr.trim()
        ))
    }
}

impl Executor {
    /// Runs the process and fails unless it exits with code 0.
    ///
    /// # Errors
    ///
    /// This function will return an error if the process could not be spawned, timed out, or exited unsuccessfully.
    pub async fn execute(&self) -> Result<ProcessOutput> {
        let output = self.run().await?;
        match output.success() {
            true => Ok(output),
            false => Err(output.into_failure()),
        }
    }

    /// Runs the process and returns its output whatever the exit code.
    ///
    /// # Errors
    ///
    /// This function will return an error if the process could not be spawned, or if it timed out.
    pub async fn run(&self) -> Result<ProcessOutput> {
        log::debug!(
            "Running {} {}",
            self.executable_path.display(),
            self.args.join(" ")
        );

        let mut command = Command::new(&self.executable_path);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(target_os = "windows")]
        {
            // CREATE_NO_WINDOW
            command.creation_flags(0x08000000);
        }

        let mut child = command.spawn()?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Both pipes are drained while waiting, a full pipe would block the child
        let wait = async {
            let (stdout, stderr) = tokio::try_join!(drain(stdout), drain(stderr))?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, stdout, stderr))
        };

        let (status, stdout, stderr) = match tokio::time::timeout(self.timeout, wait).await {
            Ok(result) => result?,
            Err(_) => {
                log::warn!(
                    "{} timed out after {:?}, killing it",
                    self.executable_path.display(),
                    self.timeout
                );
                return Err(Error::Timeout(self.timeout));
            }
        };

        Ok(ProcessOutput {
            stdout,
            stderr,
            code: status.code().unwrap_or(-1),
        })
    }
}

/// Reads a pipe to its end. Tools print file names verbatim, which may not be UTF-8.
async fn drain(pipe: Option<impl AsyncRead + Unpin>) -> std::io::Result<String> {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buffer).await?;
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
