//! Metadata management for downloaded audio files.
//!
//! Only MP3 artifacts are tagged, with ID3v2.4 frames built from what the provider listed.

use crate::error::Result;
use crate::model::SourceInfo;
use id3::frame::ExtendedText;
use id3::{Tag as ID3Tag, TagLike, Version as ID3Version};
use std::path::Path;

/// Artist written when the provider does not name one.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// The tags written to an audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTags {
    /// The track title.
    pub title: String,
    /// The artist, usually the uploading channel.
    pub artist: String,
    /// The source reference, stored as a user-defined text frame.
    pub source: String,
}

impl AudioTags {
    /// Builds the tags of a source.
    pub fn from_source(info: &SourceInfo, source: impl Into<String>) -> Self {
        Self {
            title: info.title.clone(),
            artist: info
                .uploader
                .clone()
                .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
            source: source.into(),
        }
    }
}

/// Writes the tags to an MP3 file, keeping any frame already present.
///
/// # Errors
///
/// This function will return an error if the file cannot be read or written.
pub fn tag_mp3(file_path: impl AsRef<Path>, tags: &AudioTags) -> Result<()> {
    let file_path = file_path.as_ref();
    log::debug!("Adding metadata to MP3 file: {}", file_path.display());

    // A file without a tag yet is the normal case after a conversion
    let mut tag = match ID3Tag::read_from_path(file_path) {
        Ok(tag) => tag,
        Err(_) => ID3Tag::new(),
    };

    tag.set_title(tags.title.clone());
    tag.set_artist(tags.artist.clone());
    tag.add_frame(ExtendedText {
        description: "Source".to_string(),
        value: tags.source.clone(),
    });

    tag.write_to_path(file_path, ID3Version::Id3v24)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(uploader: Option<&str>) -> SourceInfo {
        SourceInfo {
            id: "abc".to_string(),
            title: "Song: Live".to_string(),
            uploader: uploader.map(str::to_string),
            streams: Vec::new(),
        }
    }

    #[test]
    fn missing_uploader_is_unknown_artist() {
        let tags = AudioTags::from_source(&info(None), "https://youtu.be/abc");
        assert_eq!(tags.artist, UNKNOWN_ARTIST);

        let tags = AudioTags::from_source(&info(Some("Band")), "https://youtu.be/abc");
        assert_eq!(tags.artist, "Band");
        assert_eq!(tags.title, "Song: Live");
    }

    #[test]
    fn tags_are_readable_after_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"").unwrap();

        let tags = AudioTags::from_source(&info(Some("Band")), "https://youtu.be/abc");
        tag_mp3(&path, &tags).unwrap();

        let written = ID3Tag::read_from_path(&path).unwrap();
        assert_eq!(written.title(), Some("Song: Live"));
        assert_eq!(written.artist(), Some("Band"));
        assert!(
            written
                .extended_texts()
                .any(|text| text.description == "Source" && text.value == "https://youtu.be/abc")
        );
    }
}
