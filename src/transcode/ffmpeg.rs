//! FFmpeg transcoder
//!
//! Each conversion runs in a scratch directory: the input is written as
//! `input.<ext>`, FFmpeg produces `output.<ext>`, and the output bytes are
//! read back. FFmpeg's log lines are forwarded to tracing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::OnceCell;

use super::Transcoder;
use crate::media::{ContainerFormat, MediaBlob};
use crate::utils::error::{AppError, AppResult};

/// Number of FFmpeg log lines kept for error reports
const LOG_TAIL_LINES: usize = 8;

/// Transcoder that shells out to the FFmpeg binary
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    version: OnceCell<String>,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            version: OnceCell::new(),
        }
    }

    /// Make sure FFmpeg can run; checked once and cached
    ///
    /// Returns the first line of `ffmpeg -version`.
    pub async fn load(&self) -> AppResult<&str> {
        let version = self
            .version
            .get_or_try_init(|| async {
                let output = Command::new(&self.ffmpeg_path)
                    .arg("-version")
                    .stdin(Stdio::null())
                    .output()
                    .await
                    .map_err(|e| {
                        AppError::Transcode(format!(
                            "FFmpeg not found at '{}': {}. Please install FFmpeg",
                            self.ffmpeg_path, e
                        ))
                    })?;

                if !output.status.success() {
                    return Err(AppError::Transcode(format!(
                        "'{} -version' exited with status {}",
                        self.ffmpeg_path, output.status
                    )));
                }

                let stdout = String::from_utf8_lossy(&output.stdout);
                let version = stdout.lines().next().unwrap_or("ffmpeg").trim().to_string();
                tracing::info!("Loaded {}", version);
                Ok::<_, AppError>(version)
            })
            .await?;

        Ok(version.as_str())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: MediaBlob, target: ContainerFormat) -> AppResult<MediaBlob> {
        let source = ContainerFormat::from_mime(input.mime())
            .map_err(|e| AppError::Transcode(e.to_string()))?;

        if source == target {
            tracing::debug!("Recording is already {}, skipping conversion", target);
            return Ok(input);
        }

        self.load().await?;

        let workdir = tempfile::tempdir()
            .map_err(|e| AppError::Transcode(format!("Failed to create work directory: {}", e)))?;
        let input_name = format!("input.{}", source.extension());
        let output_name = format!("output.{}", target.extension());

        tokio::fs::write(workdir.path().join(&input_name), input.bytes())
            .await
            .map_err(|e| AppError::Transcode(format!("Failed to stage {}: {}", input_name, e)))?;

        let args = build_transcode_args(&input_name, &output_name, target);
        tracing::info!(
            "Converting {} bytes from {} to {}: {:?}",
            input.len(),
            source,
            target,
            args
        );

        let mut process = Command::new(&self.ffmpeg_path)
            .args(&args)
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Transcode(format!("Failed to start FFmpeg: {}", e)))?;

        let tail = match process.stderr.take() {
            Some(stderr) => drain_log_lines(stderr, LOG_TAIL_LINES).await,
            None => VecDeque::new(),
        };

        let status = process
            .wait()
            .await
            .map_err(|e| AppError::Transcode(format!("Failed to wait for FFmpeg: {}", e)))?;
        if !status.success() {
            return Err(AppError::Transcode(format!(
                "FFmpeg exited with status {}: {}",
                status,
                tail.into_iter().collect::<Vec<_>>().join("\n")
            )));
        }

        let data = tokio::fs::read(workdir.path().join(&output_name))
            .await
            .map_err(|e| AppError::Transcode(format!("Failed to read {}: {}", output_name, e)))?;
        if data.is_empty() {
            return Err(AppError::Transcode("FFmpeg produced an empty file".to_string()));
        }

        tracing::info!("Converted recording to {} ({} bytes)", target, data.len());
        Ok(MediaBlob::new(data, target.mime()))
    }
}

/// Log FFmpeg output until EOF, keeping the last `keep` lines
///
/// Lines are decoded lossily; a non-UTF-8 line must not end the read while
/// FFmpeg is still writing.
async fn drain_log_lines<R: AsyncRead + Unpin>(output: R, keep: usize) -> VecDeque<String> {
    let mut reader = BufReader::new(output);
    let mut tail = VecDeque::with_capacity(keep);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                tracing::debug!(target: "snapcam::ffmpeg", "{}", line);
                if tail.len() == keep {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Err(e) => {
                tracing::warn!("Failed to read FFmpeg log output: {}", e);
                break;
            }
        }
    }
    tail
}

/// Build the FFmpeg arguments for converting `input` into `output`
pub fn build_transcode_args(input: &str, output: &str, target: ContainerFormat) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        input.to_string(),
    ];
    args.extend(target.codec_args(false));
    args.extend(["-f".to_string(), target.muxer().to_string(), output.to_string()]);
    args
}
