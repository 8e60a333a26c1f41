//! Capture trait definitions
//!
//! Platform-agnostic traits for the live camera/microphone source.

use serde::{Deserialize, Serialize};
use std::io::Write;

use super::still::StillFrame;
use crate::utils::error::AppResult;

/// Writer that receives raw frames while a recorder is attached
pub type FrameSink = Box<dyn Write + Send>;

/// Information about an audio device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDeviceInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,

    /// Whether this is an input device
    pub is_input: bool,

    /// Whether this is the default device
    pub is_default: bool,
}

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,

    /// Supported resolutions
    pub supported_resolutions: Vec<Resolution>,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Negotiated format of an open live stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: u32,

    /// FFmpeg name of the raw frame layout (`yuyv422`, `nv12`, `rgb24`, or `mjpeg`)
    pub pixel_format: String,

    /// Whether the microphone track is part of the stream
    pub audio: bool,

    /// Microphone to record from (None = platform default)
    pub audio_device: Option<String>,
}

impl StreamInfo {
    /// Whether frames arrive as individual JPEG images rather than raw pixels
    pub fn is_mjpeg(&self) -> bool {
        self.pixel_format == "mjpeg"
    }
}

/// A live audio/video source shared by the capture controller
///
/// The controller only reads from the source. It never closes or
/// reconfigures it.
pub trait LiveSource: Send + Sync {
    /// Format of the open stream
    fn info(&self) -> StreamInfo;

    /// Whether frames can currently be read
    fn is_ready(&self) -> bool;

    /// Grab the next frame as RGB pixels, blocking until it arrives
    fn grab_still(&self) -> AppResult<StillFrame>;

    /// Start copying raw frames into `sink`
    fn attach_frame_sink(&self, sink: FrameSink) -> AppResult<()>;

    /// Stop copying frames and drop the sink
    fn detach_frame_sink(&self);
}
