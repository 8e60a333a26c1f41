//! Recording system module
//!
//! This module implements the recording side of the capture session:
//! - MediaRecorder / RecorderFactory traits for recorder backends
//! - Recording state, sessions and the ordered fragment buffer
//! - An FFmpeg-backed recorder that streams fragments from stdout

pub mod channel;
pub mod ffmpeg;
pub mod state;

pub use channel::{MediaRecorder, RecorderEvent, RecorderFactory, RecorderOptions};
pub use ffmpeg::{FfmpegRecorder, FfmpegRecorderFactory};
pub use state::{ControllerStatus, FragmentBuffer, RecordingSession, RecordingState};
