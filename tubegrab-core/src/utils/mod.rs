//! Utility functions and types used throughout the crate.

pub mod file_system;

/// Converts a vector of string slices to a vector of owned strings.
pub fn to_owned(vec: Vec<impl AsRef<str>>) -> Vec<String> {
    vec.into_iter().map(|s| s.as_ref().to_string()).collect()
}

/// Returns the executable file name for the current platform, e.g. 'ffmpeg.exe' on Windows.
pub fn find_executable(name: impl AsRef<str>) -> String {
    format!("{}{}", name.as_ref(), std::env::consts::EXE_SUFFIX)
}
