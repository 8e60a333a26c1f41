//! Live capture sources
//!
//! This module provides the webcam stream, still encoding and device
//! enumeration used by the capture controller.

pub mod devices;
pub mod still;
pub mod traits;
pub mod webcam;

// Re-export traits
pub use traits::{AudioDeviceInfo, CameraInfo, FrameSink, LiveSource, Resolution, StreamInfo};

pub use still::{ImageFormat, StillFrame};
pub use webcam::WebcamSource;
