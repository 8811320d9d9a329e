//! Tools for working with the file system.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};

/// Characters that are not allowed in a path segment on at least one supported platform.
pub const FORBIDDEN_CHARACTERS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Removes the characters of [`FORBIDDEN_CHARACTERS`] from a title.
///
/// Nothing else is touched: case, whitespace and length are preserved, and
/// sanitizing twice yields the same string.
pub fn sanitize_filename(title: impl AsRef<str>) -> String {
    title
        .as_ref()
        .chars()
        .filter(|c| !FORBIDDEN_CHARACTERS.contains(c))
        .collect()
}

/// The file name of a path, for labels and log lines.
pub fn try_name(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Path(format!("No valid file name in {}", path.display())))
}

/// Opens `destination` for writing, truncating a previous attempt's leftovers. The parent directory is created.
pub async fn create_file(destination: impl AsRef<Path>) -> Result<File> {
    let destination = destination.as_ref();
    create_parent_dir(destination)?;

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(destination)
        .await?;
    Ok(file)
}

/// `mkdir -p`.
pub fn create_dir(destination: impl AsRef<Path>) -> Result<()> {
    std::fs::create_dir_all(destination)?;
    Ok(())
}

/// Creates every missing ancestor of `destination`. A bare file name needs none.
pub fn create_parent_dir(destination: impl AsRef<Path>) -> Result<()> {
    if let Some(parent) = destination.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Makes sure a file carries an extension.
///
/// If `path` has no extension, the file is renamed on disk to `path.<extension>`
/// and the new path is returned. Otherwise the path is returned unchanged.
pub async fn correct_extension(
    path: impl AsRef<Path>,
    extension: impl AsRef<str>,
) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.extension().is_some() {
        return Ok(path.to_path_buf());
    }

    let mut renamed = path.as_os_str().to_owned();
    renamed.push(".");
    renamed.push(extension.as_ref());
    let renamed = PathBuf::from(renamed);

    tokio::fs::rename(path, &renamed).await?;
    log::info!("File renamed to {}", renamed.display());

    Ok(renamed)
}

/// Deletes an intermediate file. A failure is logged and reported as `false`, never propagated.
pub async fn remove_temp_file(file_path: impl AsRef<Path>) -> bool {
    let file_path = file_path.as_ref();
    match tokio::fs::remove_file(file_path).await {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Could not remove {}: {}", file_path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_removes_every_forbidden_character() {
        let title = r#"a<b>c:d"e/f\g|h?i*j"#;
        let clean = sanitize_filename(title);

        assert_eq!(clean, "abcdefghij");
        assert!(!clean.contains(FORBIDDEN_CHARACTERS));
    }

    #[test]
    fn sanitize_preserves_everything_else() {
        assert_eq!(
            sanitize_filename("Live @ Wembley (1986) – Part 1"),
            "Live @ Wembley (1986) – Part 1"
        );
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize_filename("What? Who: me/you");
        assert_eq!(sanitize_filename(&once), once);
    }

    #[test]
    fn sanitize_keeps_non_forbidden_remainder() {
        let clean = sanitize_filename("??x**");
        assert_eq!(clean, "x");
        assert!(sanitize_filename("<>:").is_empty());
    }

    #[tokio::test]
    async fn correct_extension_appends_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let bare = dir.path().join("song");
        tokio::fs::write(&bare, b"data").await.unwrap();

        let fixed = correct_extension(&bare, "mp3").await.unwrap();

        assert_eq!(fixed, dir.path().join("song.mp3"));
        assert!(fixed.exists());
        assert!(!bare.exists());
    }

    #[tokio::test]
    async fn correct_extension_leaves_existing_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        tokio::fs::write(&path, b"data").await.unwrap();

        assert_eq!(correct_extension(&path, "mp3").await.unwrap(), path);
    }

    #[test]
    fn try_name_needs_a_file_name() {
        assert_eq!(try_name("/music/track.mp3").unwrap(), "track.mp3");
        assert!(matches!(try_name("/"), Err(Error::Path(_))));
    }

    #[tokio::test]
    async fn create_file_creates_parents_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("clip.part");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, b"stale bytes").await.unwrap();

        drop(create_file(&path).await.unwrap());
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"");

        let fresh = dir.path().join("new").join("clip.part");
        drop(create_file(&fresh).await.unwrap());
        assert!(fresh.exists());
    }

    #[tokio::test]
    async fn remove_temp_file_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.m4a");
        assert!(!remove_temp_file(&path).await);

        tokio::fs::write(&path, b"x").await.unwrap();
        assert!(remove_temp_file(&path).await);
    }
}
