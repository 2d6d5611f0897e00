//! Audio transcoding through an external ffmpeg process.
//!
//! Input bytes are piped to ffmpeg's stdin and MP3 is read back from stdout.
//! One call, one process; nothing is written to disk.

use std::process::Stdio;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use persona_voice_core::config::MediaConfig;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("No audio provided")]
    EmptyInput,

    #[error("Failed to run ffmpeg ({path}): {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ffmpeg I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ffmpeg exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("ffmpeg produced empty output")]
    EmptyOutput,
}

#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg_path: String,
    bitrate_kbps: u32,
}

impl Transcoder {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            bitrate_kbps: config.bitrate_kbps,
        }
    }

    /// Whether the configured ffmpeg binary can be run.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok_and(|status| status.success())
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            "pipe:0".into(),
            "-vn".into(),
            "-codec:a".into(),
            "libmp3lame".into(),
            "-b:a".into(),
            format!("{}k", self.bitrate_kbps),
            "-f".into(),
            "mp3".into(),
            "pipe:1".into(),
        ]
    }

    /// Transcode arbitrary input audio to MP3.
    pub async fn to_mp3(&self, input: Bytes) -> Result<Bytes, TranscodeError> {
        if input.is_empty() {
            return Err(TranscodeError::EmptyInput);
        }
        debug!(
            ffmpeg = %self.ffmpeg_path,
            bitrate_kbps = self.bitrate_kbps,
            input_bytes = input.len(),
            "Transcoding audio"
        );

        let mut child = Command::new(&self.ffmpeg_path)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                path: self.ffmpeg_path.clone(),
                source,
            })?;

        // Feed stdin concurrently so a full stdout pipe cannot stall the write.
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                let result = stdin.write_all(&input).await;
                drop(stdin);
                result
            })
        });

        let output = child.wait_with_output().await?;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Err(e)) if output.status.success() => return Err(TranscodeError::Io(e)),
                _ => {}
            }
        }

        if !output.status.success() {
            return Err(TranscodeError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if output.stdout.is_empty() {
            return Err(TranscodeError::EmptyOutput);
        }

        debug!(output_bytes = output.stdout.len(), "Transcode complete");
        Ok(Bytes::from(output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcoder(path: &str) -> Transcoder {
        Transcoder::new(&MediaConfig {
            ffmpeg_path: path.into(),
            ..MediaConfig::default()
        })
    }

    #[test]
    fn test_args_use_configured_bitrate() {
        let t = Transcoder::new(&MediaConfig {
            bitrate_kbps: 64,
            ..MediaConfig::default()
        });
        let args = t.args();
        assert!(args.windows(2).any(|w| w[0] == "-b:a" && w[1] == "64k"));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn test_default_bitrate() {
        let args = Transcoder::new(&MediaConfig::default()).args();
        assert!(args.iter().any(|a| a == "128k"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let t = transcoder("/nonexistent/ffmpeg-binary");
        assert!(!t.is_available().await);
        let err = t.to_mp3(Bytes::from_static(b"audio")).await.unwrap_err();
        assert!(matches!(err, TranscodeError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let err = transcoder("ffmpeg").to_mp3(Bytes::new()).await.unwrap_err();
        assert!(matches!(err, TranscodeError::EmptyInput));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        // `false` ignores its arguments and exits 1
        let err = transcoder("false")
            .to_mp3(Bytes::from_static(b"audio"))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Failed { .. }));
    }
}
