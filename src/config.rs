//! Capture configuration
//!
//! Loaded from an optional JSON file; every field has a default so partial
//! files are fine. Command-line flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::capture::still::ImageFormat;
use crate::media::ContainerFormat;
use crate::utils::error::{AppError, AppResult};

/// Configuration for the capture session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfig {
    /// Camera index or name (None = first camera)
    pub camera_id: Option<String>,

    /// Requested capture width
    pub width: u32,

    /// Requested capture height
    pub height: u32,

    /// Requested capture FPS
    pub fps: u32,

    /// Whether to record the microphone alongside video
    pub audio: bool,

    /// Microphone to record from (None = platform default)
    pub audio_device: Option<String>,

    /// Mime type requested from the recorder
    pub recording_mime: String,

    /// Container to convert recordings into before saving (None = save as recorded)
    pub convert_to: Option<ContainerFormat>,

    /// Format for still photos
    pub photo_format: ImageFormat,

    /// Directory that photos and recordings are saved into
    pub output_dir: PathBuf,

    /// FFmpeg binary used for recording and conversion
    pub ffmpeg_path: String,

    /// Size of the fragments the recorder emits, in bytes
    pub fragment_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_id: None,
            width: 1280,
            height: 720,
            fps: 30,
            audio: true,
            audio_device: None,
            recording_mime: ContainerFormat::Webm.mime().to_string(),
            convert_to: Some(ContainerFormat::Mp4),
            photo_format: ImageFormat::Jpeg,
            output_dir: default_output_dir(),
            ffmpeg_path: "ffmpeg".to_string(),
            fragment_size: 64 * 1024,
        }
    }
}

impl CaptureConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: CaptureConfig = serde_json::from_str(&content)?;
        config.validate()?;

        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration if the file exists, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> AppResult<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                tracing::warn!("Config file {:?} not found, using defaults", path);
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Write configuration as pretty JSON
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Check values that would only fail later, deep inside a recording
    pub fn validate(&self) -> AppResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(AppError::Config(format!(
                "Invalid resolution {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(AppError::Config("fps must be greater than zero".to_string()));
        }
        if self.fragment_size == 0 {
            return Err(AppError::Config(
                "fragmentSize must be greater than zero".to_string(),
            ));
        }
        let container = ContainerFormat::from_mime(&self.recording_mime)?;
        if !container.is_streamable() {
            return Err(AppError::Config(format!(
                "{} cannot be recorded live; record webm or matroska and convert instead",
                self.recording_mime
            )));
        }
        Ok(())
    }

    /// Container the recorder writes into
    pub fn recording_container(&self) -> AppResult<ContainerFormat> {
        ContainerFormat::from_mime(&self.recording_mime)
    }
}

/// Default location for saved captures
pub fn default_output_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("snapcam")
}
