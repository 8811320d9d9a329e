//! Merging split streams and converting audio with the transcoder.

use crate::error::{Error, Result};
use crate::model::AudioFormat;
use crate::transcoder::Transcoder;
use crate::utils::file_system;
use std::path::{Path, PathBuf};

/// The default bitrate of lossy audio conversions.
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";

/// Runs the transcoder to produce final artifacts from fetched streams.
///
/// Inputs are removed only when the transcoder succeeds; after a failure they stay in place for the next attempt.
#[derive(Debug, Clone)]
pub struct Assembler {
    transcoder: Transcoder,
}

impl Assembler {
    /// Creates an assembler using the given transcoder.
    pub fn new(transcoder: Transcoder) -> Self {
        Self { transcoder }
    }

    /// Multiplexes a video-only and an audio-only file into one output, without re-encoding.
    ///
    /// # Arguments
    ///
    /// * `video` - The video-only input.
    /// * `audio` - The audio-only input.
    /// * `output` - The file to create, overwritten if present.
    ///
    /// # Errors
    ///
    /// This function will return an error if the transcoder cannot be run, times out, or exits unsuccessfully.
    pub async fn merge(
        &self,
        video: impl AsRef<Path>,
        audio: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<PathBuf> {
        let (video, audio, output) = (video.as_ref(), audio.as_ref(), output.as_ref());
        log::debug!(
            "Merging {} and {} into {}",
            video.display(),
            audio.display(),
            output.display()
        );

        file_system::create_parent_dir(output)?;
        let args = vec![
            "-y",
            "-i",
            path_str(video)?,
            "-i",
            path_str(audio)?,
            "-c",
            "copy",
            path_str(output)?,
        ];
        self.transcoder.command(args).execute().await?;

        file_system::remove_temp_file(video).await;
        file_system::remove_temp_file(audio).await;

        Ok(output.to_path_buf())
    }

    /// Re-encodes one audio input into the target format.
    ///
    /// # Arguments
    ///
    /// * `input` - The file to convert, in any format the transcoder reads.
    /// * `output` - The file to create, overwritten if present.
    /// * `format` - The target format.
    /// * `bitrate` - The target bitrate, e.g. '192k'. Ignored for lossless formats.
    ///
    /// # Errors
    ///
    /// This function will return an error if the transcoder cannot be run, times out, or exits unsuccessfully.
    pub async fn convert(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        format: AudioFormat,
        bitrate: &str,
    ) -> Result<PathBuf> {
        let (input, output) = (input.as_ref(), output.as_ref());
        log::debug!(
            "Converting {} to {} ({} at {})",
            input.display(),
            output.display(),
            format,
            bitrate
        );

        file_system::create_parent_dir(output)?;
        let mut args = vec!["-y", "-i", path_str(input)?, "-vn", "-c:a", format.codec()];
        if !format.is_lossless() {
            args.extend(["-b:a", bitrate]);
        }
        args.push(path_str(output)?);

        self.transcoder.command(args).execute().await?;
        file_system::remove_temp_file(input).await;

        Ok(output.to_path_buf())
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::Path(format!("Invalid path: {}", path.display())))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::fake_ffmpeg;

    struct Fixture {
        dir: tempfile::TempDir,
        video: PathBuf,
        audio: PathBuf,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("Clip [abc]_video.mp4");
        let audio = dir.path().join("Clip [abc]_audio.m4a");
        tokio::fs::write(&video, b"video").await.unwrap();
        tokio::fs::write(&audio, b"audio").await.unwrap();

        Fixture { dir, video, audio }
    }

    #[tokio::test]
    async fn merge_success_removes_inputs_and_leaves_one_output() {
        let fixture = fixture().await;
        let ffmpeg = fake_ffmpeg(fixture.dir.path(), "merged", 0);
        let output = fixture.dir.path().join("out").join("Clip [abc].part.mp4");

        let merged = Assembler::new(Transcoder::new(ffmpeg))
            .merge(&fixture.video, &fixture.audio, &output)
            .await
            .unwrap();

        assert_eq!(merged, output);
        assert_eq!(tokio::fs::read_to_string(&output).await.unwrap(), "merged");
        assert!(!fixture.video.exists());
        assert!(!fixture.audio.exists());
    }

    #[tokio::test]
    async fn merge_failure_keeps_inputs() {
        let fixture = fixture().await;
        let ffmpeg = fake_ffmpeg(fixture.dir.path(), "", 1);
        let output = fixture.dir.path().join("Clip [abc].part.mp4");

        let err = Assembler::new(Transcoder::new(ffmpeg))
            .merge(&fixture.video, &fixture.audio, &output)
            .await
            .unwrap_err();

        match err {
            Error::Command(message) => assert!(message.contains("Conversion failed!")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(fixture.video.exists());
        assert!(fixture.audio.exists());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn convert_success_removes_input() {
        let fixture = fixture().await;
        let ffmpeg = fake_ffmpeg(fixture.dir.path(), "mp3 data", 0);
        let output = fixture.dir.path().join("Clip [abc].part.mp3");

        Assembler::new(Transcoder::new(ffmpeg))
            .convert(&fixture.audio, &output, AudioFormat::Mp3, DEFAULT_AUDIO_BITRATE)
            .await
            .unwrap();

        assert!(output.exists());
        assert!(!fixture.audio.exists());
    }

    #[tokio::test]
    async fn convert_timeout_keeps_input() {
        let fixture = fixture().await;
        let ffmpeg = crate::testing::fake_tool(fixture.dir.path(), "ffmpeg", "sleep 5");
        let transcoder = Transcoder::new(ffmpeg).with_timeout(std::time::Duration::from_millis(100));
        let output = fixture.dir.path().join("Clip [abc].part.flac");

        let err = Assembler::new(transcoder)
            .convert(&fixture.audio, &output, AudioFormat::Flac, DEFAULT_AUDIO_BITRATE)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout(_)));
        assert!(fixture.audio.exists());
    }
}
