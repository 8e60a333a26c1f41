//! In-memory stand-ins for the camera, recorder, transcoder and save sink

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use snapcam::capture::{FrameSink, LiveSource, StillFrame, StreamInfo};
use snapcam::controller::{CaptureController, ControllerSettings, SaveJob};
use snapcam::media::{ContainerFormat, MediaBlob};
use snapcam::recorder::{MediaRecorder, RecorderEvent, RecorderFactory, RecorderOptions};
use snapcam::save::SaveSink;
use snapcam::transcode::Transcoder;
use snapcam::utils::{AppError, AppResult};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use tokio::sync::mpsc;

pub struct StubSource {
    pub ready: AtomicBool,
    pub grabs: AtomicUsize,
}

impl StubSource {
    pub fn new(ready: bool) -> Arc<Self> {
        Arc::new(Self {
            ready: AtomicBool::new(ready),
            grabs: AtomicUsize::new(0),
        })
    }
}

impl LiveSource for StubSource {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            width: 2,
            height: 2,
            fps: 30,
            pixel_format: "rgb24".to_string(),
            audio: true,
            audio_device: None,
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn grab_still(&self) -> AppResult<StillFrame> {
        self.grabs.fetch_add(1, Ordering::SeqCst);
        Ok(StillFrame {
            width: 2,
            height: 2,
            rgb: vec![200; 12],
        })
    }

    fn attach_frame_sink(&self, _sink: FrameSink) -> AppResult<()> {
        Ok(())
    }

    fn detach_frame_sink(&self) {}
}

/// Recorder factory whose recorders flush `tail` fragments when stopped
///
/// `error_on_stop` makes the recorder report an error before it stops;
/// `fail_stop` makes `stop()` itself fail without any stop notification.
#[derive(Default)]
pub struct ScriptedFactory {
    pub fail: bool,
    pub fail_stop: bool,
    pub error_on_stop: Option<String>,
    pub tail: Vec<usize>,
    pub created: AtomicUsize,
}

impl ScriptedFactory {
    pub fn new(tail: Vec<usize>) -> Arc<Self> {
        Arc::new(Self {
            tail,
            ..Self::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn failing_stop() -> Arc<Self> {
        Arc::new(Self {
            fail_stop: true,
            ..Self::default()
        })
    }

    pub fn erroring(tail: Vec<usize>, message: &str) -> Arc<Self> {
        Arc::new(Self {
            tail,
            error_on_stop: Some(message.to_string()),
            ..Self::default()
        })
    }
}

impl RecorderFactory for ScriptedFactory {
    fn create(
        &self,
        _source: Arc<dyn LiveSource>,
        options: RecorderOptions,
    ) -> AppResult<Box<dyn MediaRecorder>> {
        if self.fail {
            return Err(AppError::RecorderConstruction(format!(
                "{} is not supported",
                options.mime_type
            )));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedRecorder {
            options,
            tail: self.tail.clone(),
            fail_stop: self.fail_stop,
            error_on_stop: self.error_on_stop.clone(),
            recording: false,
        }))
    }
}

pub struct ScriptedRecorder {
    options: RecorderOptions,
    tail: Vec<usize>,
    fail_stop: bool,
    error_on_stop: Option<String>,
    recording: bool,
}

impl MediaRecorder for ScriptedRecorder {
    fn mime_type(&self) -> &str {
        &self.options.mime_type
    }

    fn start(&mut self) -> AppResult<()> {
        self.recording = true;
        Ok(())
    }

    fn stop(&mut self) -> AppResult<()> {
        self.recording = false;
        if self.fail_stop {
            return Err(AppError::Recorder("recorder refused to stop".to_string()));
        }

        let session = self.options.session_id;
        for size in &self.tail {
            let _ = self.options.events.send(RecorderEvent::Data {
                session,
                data: Bytes::from(vec![0xAB; *size]),
            });
        }
        if let Some(message) = self.error_on_stop.take() {
            let _ = self.options.events.send(RecorderEvent::Error { session, message });
        }
        let _ = self.options.events.send(RecorderEvent::Stopped { session });
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}

#[derive(Default)]
pub struct StubTranscoder {
    pub fail: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl Transcoder for StubTranscoder {
    async fn transcode(&self, input: MediaBlob, target: ContainerFormat) -> AppResult<MediaBlob> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::Transcode("synthetic failure".to_string()));
        }
        Ok(MediaBlob::new(input.into_bytes(), target.mime()))
    }
}

#[derive(Default)]
pub struct MemorySink {
    pub saves: Mutex<Vec<(String, MediaBlob)>>,
    /// Thread each save ran on
    pub threads: Mutex<Vec<ThreadId>>,
}

impl SaveSink for MemorySink {
    fn save(&self, blob: &MediaBlob, filename: &str) -> AppResult<PathBuf> {
        self.saves.lock().push((filename.to_string(), blob.clone()));
        self.threads.lock().push(std::thread::current().id());
        Ok(PathBuf::from(filename))
    }
}

#[derive(Default)]
pub struct FailingSink {
    pub attempts: AtomicUsize,
}

impl SaveSink for FailingSink {
    fn save(&self, _blob: &MediaBlob, filename: &str) -> AppResult<PathBuf> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AppError::Save(format!("disk full while writing {}", filename)))
    }
}

pub fn settings(convert_to: Option<ContainerFormat>) -> ControllerSettings {
    ControllerSettings {
        convert_to,
        ..ControllerSettings::default()
    }
}

pub fn controller(
    source: Arc<StubSource>,
    factory: Arc<ScriptedFactory>,
    sink: Arc<MemorySink>,
    settings: ControllerSettings,
) -> CaptureController {
    CaptureController::new(source, factory, sink, settings)
}

/// Feed queued recorder events back into the controller, running any save jobs
pub async fn pump(
    controller: &mut CaptureController,
    events: &mut mpsc::UnboundedReceiver<RecorderEvent>,
) -> Vec<Option<PathBuf>> {
    let mut jobs: Vec<SaveJob> = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let Some(job) = controller.handle_recorder_event(event) {
            jobs.push(job);
        }
    }

    let mut saved = Vec::new();
    for job in jobs {
        saved.push(job.run().await);
    }
    saved
}
