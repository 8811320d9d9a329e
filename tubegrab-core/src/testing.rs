//! Helpers shared by the unit tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Writes an executable POSIX shell script standing in for an external tool.
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A fake 'ffmpeg' that writes `content` to its last argument and exits with `code`.
pub fn fake_ffmpeg(dir: &Path, content: &str, code: i32) -> PathBuf {
    fake_tool(
        dir,
        "ffmpeg",
        &format!(
            "for last; do :; done\nif [ {code} -eq 0 ]; then printf '%s' '{content}' > \"$last\"; else echo 'Conversion failed!' >&2; fi\nexit {code}"
        ),
    )
}
