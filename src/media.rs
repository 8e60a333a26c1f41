//! Media blobs and container formats
//!
//! A [`MediaBlob`] is a chunk of encoded bytes tagged with its media type.
//! [`ContainerFormat`] maps the containers we record into and convert to onto
//! mime types, file extensions and FFmpeg muxer/codec arguments.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::error::AppError;

/// Binary object tagged with a media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBlob {
    bytes: Bytes,
    mime: String,
}

impl MediaBlob {
    pub fn new(bytes: impl Into<Bytes>, mime: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime: mime.into(),
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Declared media type (e.g. `video/webm`)
    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Video container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Webm,
    #[serde(alias = "mkv")]
    Matroska,
    Mp4,
}

impl ContainerFormat {
    /// Get the media type for this container
    pub fn mime(&self) -> &'static str {
        match self {
            ContainerFormat::Webm => "video/webm",
            ContainerFormat::Matroska => "video/x-matroska",
            ContainerFormat::Mp4 => "video/mp4",
        }
    }

    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Webm => "webm",
            ContainerFormat::Matroska => "mkv",
            ContainerFormat::Mp4 => "mp4",
        }
    }

    /// FFmpeg muxer name (`-f` argument)
    pub fn muxer(&self) -> &'static str {
        match self {
            ContainerFormat::Webm => "webm",
            ContainerFormat::Matroska => "matroska",
            ContainerFormat::Mp4 => "mp4",
        }
    }

    /// Get the FFmpeg video codec for this format
    pub fn video_codec(&self) -> &'static str {
        match self {
            ContainerFormat::Webm => "libvpx",
            ContainerFormat::Matroska => "libvpx",
            ContainerFormat::Mp4 => "libx264",
        }
    }

    /// Get the FFmpeg audio codec for this format
    pub fn audio_codec(&self) -> &'static str {
        match self {
            ContainerFormat::Webm | ContainerFormat::Matroska => "libopus",
            ContainerFormat::Mp4 => "aac",
        }
    }

    /// Whether the muxer can write to a non-seekable pipe while recording
    ///
    /// MP4 needs to seek back to write its index, so it is only usable as a
    /// transcode target.
    pub fn is_streamable(&self) -> bool {
        matches!(self, ContainerFormat::Webm | ContainerFormat::Matroska)
    }

    /// Codec arguments for encoding into this container
    ///
    /// `realtime` trades compression for speed when encoding live frames.
    pub fn codec_args(&self, realtime: bool) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.video_codec().to_string()];
        match self {
            ContainerFormat::Webm | ContainerFormat::Matroska => {
                if realtime {
                    args.extend([
                        "-deadline".to_string(),
                        "realtime".to_string(),
                        "-cpu-used".to_string(),
                        "8".to_string(),
                    ]);
                }
                args.extend(["-b:v".to_string(), "2M".to_string()]);
            }
            ContainerFormat::Mp4 => {
                args.extend([
                    "-preset".to_string(),
                    if realtime { "veryfast" } else { "medium" }.to_string(),
                    "-crf".to_string(),
                    "23".to_string(),
                    "-pix_fmt".to_string(),
                    "yuv420p".to_string(),
                    "-movflags".to_string(),
                    "+faststart".to_string(),
                ]);
            }
        }
        args.extend(["-c:a".to_string(), self.audio_codec().to_string()]);
        args
    }

    /// Resolve a mime type such as `video/webm;codecs=vp8,opus`
    pub fn from_mime(mime: &str) -> Result<Self, AppError> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "video/webm" => Ok(ContainerFormat::Webm),
            "video/x-matroska" | "video/matroska" => Ok(ContainerFormat::Matroska),
            "video/mp4" => Ok(ContainerFormat::Mp4),
            _ => Err(AppError::UnsupportedMimeType(mime.to_string())),
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ContainerFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webm" => Ok(ContainerFormat::Webm),
            "mkv" | "matroska" => Ok(ContainerFormat::Matroska),
            "mp4" => Ok(ContainerFormat::Mp4),
            other => Err(AppError::Config(format!("Unknown container format: {other}"))),
        }
    }
}
