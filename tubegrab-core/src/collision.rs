//! Placing finished artifacts next to files that may already exist.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// What to do when the desired path is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionDecision {
    /// Keep the existing file and drop the new one.
    Skip,
    /// Place the new file under the first free "<base> (n)<ext>" name.
    Rename,
    /// Replace the existing file.
    Overwrite,
}

impl fmt::Display for CollisionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollisionDecision::Skip => write!(f, "skip"),
            CollisionDecision::Rename => write!(f, "rename"),
            CollisionDecision::Overwrite => write!(f, "overwrite"),
        }
    }
}

/// Decides what happens to a new artifact whose path is already taken.
///
/// Decisions are asked one at a time per directory, so an interactive implementation never sees two prompts
/// for the same directory at once.
#[async_trait]
pub trait CollisionPolicy: Send + Sync {
    /// Decides for the given existing path.
    async fn decide(&self, existing: &Path) -> CollisionDecision;
}

/// A fixed decision applied to every collision.
#[async_trait]
impl CollisionPolicy for CollisionDecision {
    async fn decide(&self, _existing: &Path) -> CollisionDecision {
        *self
    }
}

/// Where an artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The artifact was moved to this path.
    Placed(PathBuf),
    /// The artifact was dropped because this path already existed.
    Skipped(PathBuf),
}

/// Moves staged artifacts to their final path, one directory probe at a time.
pub struct CollisionResolver {
    policy: Arc<dyn CollisionPolicy>,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl fmt::Debug for CollisionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollisionResolver").finish_non_exhaustive()
    }
}

impl CollisionResolver {
    /// Creates a resolver asking the given policy on collisions.
    pub fn new(policy: Arc<dyn CollisionPolicy>) -> Self {
        Self {
            policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn directory_lock(&self, dir: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(dir.to_path_buf()).or_default())
    }

    /// Moves `staging` to `desired`, or to a renamed path, or drops it, depending on what exists and on the policy.
    ///
    /// The directory of `desired` stays locked from the existence probe until the move is done,
    /// so two concurrent commits never claim the same name.
    ///
    /// # Errors
    ///
    /// This function will return an error if the file system refuses the move, or if no free name is found.
    pub async fn commit(
        &self,
        staging: impl AsRef<Path>,
        desired: impl AsRef<Path>,
    ) -> Result<Resolution> {
        let (staging, desired) = (staging.as_ref(), desired.as_ref());
        let dir = desired.parent().unwrap_or_else(|| Path::new(""));

        let lock = self.directory_lock(dir);
        let _guard = lock.lock().await;

        if !tokio::fs::try_exists(desired).await? {
            tokio::fs::rename(staging, desired).await?;
            return Ok(Resolution::Placed(desired.to_path_buf()));
        }

        let decision = self.policy.decide(desired).await;
        log::info!("{} already exists, decision: {}", desired.display(), decision);

        match decision {
            CollisionDecision::Skip => {
                tokio::fs::remove_file(staging).await?;
                Ok(Resolution::Skipped(desired.to_path_buf()))
            }
            CollisionDecision::Overwrite => {
                tokio::fs::rename(staging, desired).await?;
                Ok(Resolution::Placed(desired.to_path_buf()))
            }
            CollisionDecision::Rename => {
                let renamed = next_available_path(desired).await?;
                tokio::fs::rename(staging, &renamed).await?;
                Ok(Resolution::Placed(renamed))
            }
        }
    }
}

/// Returns the first of "<base> (1)<ext>", "<base> (2)<ext>", … that does not exist.
///
/// # Errors
///
/// Returns [`Error::Path`] if the path has no file name, or if every candidate is taken.
pub async fn next_available_path(path: &Path) -> Result<PathBuf> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Path(format!("Cannot extract file stem: {}", path.display())))?;
    let extension = path.extension().and_then(|e| e.to_str());
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let new_name = match extension {
            Some(ext) => format!("{} ({}).{}", stem, i, ext),
            None => format!("{} ({})", stem, i),
        };
        let new_path = parent.join(new_name);
        if !tokio::fs::try_exists(&new_path).await? {
            return Ok(new_path);
        }
    }

    Err(Error::Path(format!(
        "Could not find a free name for {} after {} attempts",
        path.display(),
        MAX_RENAME_ATTEMPTS
    )))
}
