//! Webcam capture using nokhwa
//!
//! The camera lives on a dedicated worker thread for its whole lifetime
//! (camera handles are not `Send` on every backend). The worker serves still
//! requests and, while a recorder is attached, copies raw frames into the
//! recorder's sink.

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use parking_lot::Mutex as ParkingMutex;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::devices::has_default_audio_input;
use super::still::StillFrame;
use super::traits::{FrameSink, LiveSource, StreamInfo};
use crate::config::CaptureConfig;
use crate::utils::error::{AppError, AppResult};

/// Consecutive frame errors after which the stream counts as lost
const MAX_FRAME_ERRORS: u32 = 30;

/// Pause between frame retries once the stream is lost
const LOST_STREAM_BACKOFF: Duration = Duration::from_millis(250);

enum WorkerRequest {
    Still(SyncSender<Result<StillFrame, String>>),
    AttachSink(FrameSink),
    DetachSink,
    Shutdown,
}

/// Live webcam stream backed by a nokhwa camera
pub struct WebcamSource {
    requests: Sender<WorkerRequest>,
    info: StreamInfo,
    ready: Arc<AtomicBool>,
    worker: ParkingMutex<Option<JoinHandle<()>>>,
}

impl WebcamSource {
    /// Open the configured camera and wait until its stream is running
    pub fn open(config: &CaptureConfig) -> AppResult<Self> {
        let camera_index = camera_index(config.camera_id.as_deref());
        let requested = CameraFormat::new_from(config.width, config.height, FrameFormat::MJPEG, config.fps);
        let audio = config.audio && has_default_audio_input();
        if config.audio && !audio {
            tracing::warn!("No microphone found, recording video only");
        }
        let audio_device = config.audio_device.clone();

        let (request_tx, request_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let ready = Arc::new(AtomicBool::new(false));
        let worker_ready = ready.clone();

        let handle = std::thread::Builder::new()
            .name("snapcam-camera".to_string())
            .spawn(move || {
                let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(requested));

                let mut camera = match Camera::new(camera_index.clone(), format) {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("Failed to open camera {camera_index:?}: {e}")));
                        return;
                    }
                };

                if let Err(e) = camera.open_stream() {
                    let _ = ready_tx.send(Err(format!("Failed to open camera stream: {e}")));
                    return;
                }

                let camera_format = camera.camera_format();
                let frame_format = camera_format.format();
                let info = StreamInfo {
                    width: camera_format.resolution().width(),
                    height: camera_format.resolution().height(),
                    fps: camera_format.frame_rate(),
                    pixel_format: ffmpeg_pixel_format(frame_format).to_string(),
                    audio,
                    audio_device,
                };

                tracing::info!(
                    "Webcam opened: {}x{} @ {}fps, format={:?} -> ffmpeg pix_fmt={}",
                    info.width,
                    info.height,
                    info.fps,
                    frame_format,
                    info.pixel_format
                );

                worker_ready.store(true, Ordering::SeqCst);
                let _ = ready_tx.send(Ok(info));

                let mut health = StreamHealth::new(worker_ready.clone());
                run_worker(&mut camera, &request_rx, &mut health);

                worker_ready.store(false, Ordering::SeqCst);
                if let Err(e) = camera.stop_stream() {
                    tracing::warn!("Error stopping camera stream: {:?}", e);
                }
                tracing::info!("Webcam worker stopped");
            })?;

        let info = match ready_rx.recv() {
            Ok(Ok(info)) => info,
            Ok(Err(message)) => {
                let _ = handle.join();
                return Err(AppError::StreamUnavailable(message));
            }
            Err(_) => {
                let _ = handle.join();
                return Err(AppError::StreamUnavailable(
                    "Camera worker exited before the stream opened".to_string(),
                ));
            }
        };

        Ok(Self {
            requests: request_tx,
            info,
            ready,
            worker: ParkingMutex::new(Some(handle)),
        })
    }

    fn send(&self, request: WorkerRequest) -> AppResult<()> {
        self.requests
            .send(request)
            .map_err(|_| AppError::StreamUnavailable("Camera worker is not running".to_string()))
    }
}

impl LiveSource for WebcamSource {
    fn info(&self) -> StreamInfo {
        self.info.clone()
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn grab_still(&self) -> AppResult<StillFrame> {
        if !self.is_ready() {
            return Err(AppError::StreamUnavailable("Camera stream is not running".to_string()));
        }

        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.send(WorkerRequest::Still(reply_tx))?;

        match reply_rx.recv() {
            Ok(result) => result.map_err(AppError::Capture),
            Err(_) => Err(AppError::StreamUnavailable(
                "Camera worker dropped the still request".to_string(),
            )),
        }
    }

    fn attach_frame_sink(&self, sink: FrameSink) -> AppResult<()> {
        if !self.is_ready() {
            return Err(AppError::StreamUnavailable("Camera stream is not running".to_string()));
        }
        self.send(WorkerRequest::AttachSink(sink))
    }

    fn detach_frame_sink(&self) {
        let _ = self.send(WorkerRequest::DetachSink);
    }
}

impl Drop for WebcamSource {
    fn drop(&mut self) {
        let _ = self.requests.send(WorkerRequest::Shutdown);
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Tracks consecutive frame failures and publishes stream readiness
struct StreamHealth {
    ready: Arc<AtomicBool>,
    errors: u32,
}

impl StreamHealth {
    fn new(ready: Arc<AtomicBool>) -> Self {
        Self { ready, errors: 0 }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Record a delivered frame; returns true if the stream just came back
    fn frame_ok(&mut self) -> bool {
        self.errors = 0;
        !self.ready.swap(true, Ordering::SeqCst)
    }

    /// Record a failed frame; returns true if the stream was just lost
    fn frame_failed(&mut self) -> bool {
        self.errors = self.errors.saturating_add(1);
        self.errors >= MAX_FRAME_ERRORS && self.ready.swap(false, Ordering::SeqCst)
    }

    /// Whether retries should be slowed down
    fn is_lost(&self) -> bool {
        self.errors >= MAX_FRAME_ERRORS
    }
}

fn run_worker(camera: &mut Camera, requests: &Receiver<WorkerRequest>, health: &mut StreamHealth) {
    let mut sink: Option<FrameSink> = None;
    let mut pending: Vec<SyncSender<Result<StillFrame, String>>> = Vec::new();
    let mut frames_written: u64 = 0;

    loop {
        loop {
            match requests.try_recv() {
                Ok(WorkerRequest::Still(reply)) if !health.is_ready() => {
                    let _ = reply.send(Err("Camera stream is not delivering frames".to_string()));
                }
                Ok(WorkerRequest::Still(reply)) => pending.push(reply),
                Ok(WorkerRequest::AttachSink(new_sink)) => {
                    tracing::debug!("Frame sink attached");
                    frames_written = 0;
                    sink = Some(new_sink);
                }
                Ok(WorkerRequest::DetachSink) => {
                    if let Some(mut old) = sink.take() {
                        let _ = old.flush();
                        tracing::debug!("Frame sink detached after {} frames", frames_written);
                    }
                }
                Ok(WorkerRequest::Shutdown) | Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => break,
            }
        }

        // Blocks until the camera delivers the next frame
        let frame = match camera.frame() {
            Ok(frame) => {
                if health.frame_ok() {
                    tracing::info!("Camera stream recovered");
                }
                frame
            }
            Err(e) => {
                tracing::debug!("Failed to capture frame: {:?}", e);
                if health.frame_failed() {
                    tracing::error!("Camera stopped delivering frames: {}", e);
                }
                if health.is_lost() {
                    for reply in pending.drain(..) {
                        let _ = reply.send(Err(format!("Camera stopped delivering frames: {e}")));
                    }
                    std::thread::sleep(LOST_STREAM_BACKOFF);
                }
                continue;
            }
        };

        if let Some(active) = sink.as_mut() {
            match active.write_all(frame.buffer()) {
                Ok(()) => frames_written += 1,
                Err(e) => {
                    // The recorder went away; stop feeding it
                    tracing::warn!("Frame sink write failed, detaching: {}", e);
                    sink = None;
                }
            }
        }

        if !pending.is_empty() {
            let still = frame
                .decode_image::<RgbFormat>()
                .map(|image| StillFrame {
                    width: image.width(),
                    height: image.height(),
                    rgb: image.into_raw(),
                })
                .map_err(|e| format!("Failed to decode frame: {e}"));

            for reply in pending.drain(..) {
                let _ = reply.send(still.clone());
            }
        }
    }
}

fn camera_index(camera_id: Option<&str>) -> CameraIndex {
    match camera_id {
        Some(id) => match id.parse::<u32>() {
            Ok(idx) => CameraIndex::Index(idx),
            Err(_) => CameraIndex::String(id.to_string()),
        },
        None => CameraIndex::Index(0),
    }
}

/// Map nokhwa FrameFormat to FFmpeg pixel format string
fn ffmpeg_pixel_format(format: FrameFormat) -> &'static str {
    match format {
        FrameFormat::YUYV => "yuyv422",
        FrameFormat::NV12 => "nv12",
        FrameFormat::RAWRGB => "rgb24",
        FrameFormat::MJPEG => "mjpeg",
        FrameFormat::GRAY => "gray",
        _ => {
            tracing::warn!("Unknown camera format {:?}, falling back to yuyv422", format);
            "yuyv422"
        }
    }
}
