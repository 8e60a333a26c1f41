//! Recording conversion
//!
//! Converts an assembled recording from its capture container into another
//! container before it is saved.

pub mod ffmpeg;

pub use ffmpeg::FfmpegTranscoder;

use async_trait::async_trait;

use crate::media::{ContainerFormat, MediaBlob};
use crate::utils::error::AppResult;

/// Converts a media blob into another container
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Convert `input` into `target`; the output is tagged with the target's mime type
    async fn transcode(&self, input: MediaBlob, target: ContainerFormat) -> AppResult<MediaBlob>;
}
