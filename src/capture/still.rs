//! Still image encoding
//!
//! Turns a single RGB frame grabbed from the live stream into an image blob.

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::media::MediaBlob;
use crate::utils::error::{AppError, AppResult};

/// JPEG quality used for photos
const JPEG_QUALITY: u8 = 92;

/// One RGB frame (3 bytes per pixel, row-major)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StillFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl StillFrame {
    fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Photo output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            other => Err(AppError::Config(format!("Unknown image format: {other}"))),
        }
    }
}

/// Encode a frame into an image blob
pub fn encode(frame: &StillFrame, format: ImageFormat) -> AppResult<MediaBlob> {
    if frame.width == 0 || frame.height == 0 {
        return Err(AppError::Capture("Empty frame".to_string()));
    }
    if frame.rgb.len() != frame.expected_len() {
        return Err(AppError::Capture(format!(
            "Frame buffer is {} bytes, expected {} for {}x{} RGB",
            frame.rgb.len(),
            frame.expected_len(),
            frame.width,
            frame.height
        )));
    }

    let bytes = match format {
        ImageFormat::Jpeg => encode_jpeg(frame)?,
        ImageFormat::Png => encode_png(frame)?,
    };

    tracing::debug!(
        "Encoded {}x{} still as {} ({} bytes)",
        frame.width,
        frame.height,
        format.mime(),
        bytes.len()
    );

    Ok(MediaBlob::new(bytes, format.mime()))
}

fn encode_jpeg(frame: &StillFrame) -> AppResult<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode(&frame.rgb, frame.width, frame.height, ExtendedColorType::Rgb8)
        .map_err(|e| AppError::Capture(format!("JPEG encoding failed: {e}")))?;
    Ok(out)
}

fn encode_png(frame: &StillFrame) -> AppResult<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, frame.width, frame.height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder
            .write_header()
            .map_err(|e| AppError::Capture(format!("PNG header failed: {e}")))?;
        writer
            .write_image_data(&frame.rgb)
            .map_err(|e| AppError::Capture(format!("PNG encoding failed: {e}")))?;
        writer
            .finish()
            .map_err(|e| AppError::Capture(format!("PNG encoding failed: {e}")))?;
    }
    Ok(out)
}
