//! Capture session controller
//!
//! Owns the recording session and drives the Idle/Recording lifecycle,
//! buffers recorder fragments, and hands finished recordings to a
//! [`SaveJob`] that optionally converts and then saves them. Photo capture
//! is a separate, stateless path.
//!
//! Failures of external collaborators are logged and broadcast as
//! [`CaptureEvent::Failed`]; they never propagate to the caller.

pub mod handle;

pub use handle::{Command, ControllerHandle};

use bytes::Bytes;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::capture::still::{self, ImageFormat};
use crate::capture::LiveSource;
use crate::config::CaptureConfig;
use crate::media::{ContainerFormat, MediaBlob};
use crate::recorder::{
    ControllerStatus, MediaRecorder, RecorderEvent, RecorderFactory, RecorderOptions,
    RecordingSession, RecordingState,
};
use crate::save::SaveSink;
use crate::transcode::Transcoder;
use crate::utils::error::AppError;
use crate::utils::filename::{timestamped_filename, PHOTO_KIND, RECORDING_KIND};

/// Events broadcast to front ends
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CaptureEvent {
    PhotoSaved { path: PathBuf },
    RecordingStarted { session_id: Uuid },
    RecordingStopped { session_id: Uuid },
    Converting { target: ContainerFormat },
    RecordingSaved { path: PathBuf, bytes: usize },
    Failed { code: String, message: String },
}

/// Behavior knobs taken from the configuration
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub recording_mime: String,
    pub photo_format: ImageFormat,
    pub convert_to: Option<ContainerFormat>,
}

impl From<&CaptureConfig> for ControllerSettings {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            recording_mime: config.recording_mime.clone(),
            photo_format: config.photo_format,
            convert_to: config.convert_to,
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

/// Drives photo capture and the recording lifecycle
pub struct CaptureController {
    source: Arc<dyn LiveSource>,
    recorders: Arc<dyn RecorderFactory>,
    transcoder: Option<Arc<dyn Transcoder>>,
    sink: Arc<dyn SaveSink>,
    settings: ControllerSettings,

    session: Option<RecordingSession>,
    recorder: Option<Box<dyn MediaRecorder>>,

    /// Save jobs created but not yet finished
    in_flight: Arc<AtomicUsize>,

    recorder_tx: mpsc::UnboundedSender<RecorderEvent>,
    recorder_rx: Option<mpsc::UnboundedReceiver<RecorderEvent>>,
    event_tx: broadcast::Sender<CaptureEvent>,
}

impl CaptureController {
    /// Create a controller without conversion
    pub fn new(
        source: Arc<dyn LiveSource>,
        recorders: Arc<dyn RecorderFactory>,
        sink: Arc<dyn SaveSink>,
        settings: ControllerSettings,
    ) -> Self {
        let (recorder_tx, recorder_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(100);
        Self {
            source,
            recorders,
            transcoder: None,
            sink,
            settings,
            session: None,
            recorder: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
            recorder_tx,
            recorder_rx: Some(recorder_rx),
            event_tx,
        }
    }

    /// Convert recordings with `transcoder` before saving them
    pub fn with_transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    /// Subscribe to capture events
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.event_tx.subscribe()
    }

    /// Take the receiving end of the recorder event channel
    ///
    /// Whoever drives the controller feeds these back into
    /// [`handle_recorder_event`](Self::handle_recorder_event).
    pub fn take_recorder_events(&mut self) -> Option<mpsc::UnboundedReceiver<RecorderEvent>> {
        self.recorder_rx.take()
    }

    /// Get the current recording state
    pub fn state(&self) -> RecordingState {
        self.session
            .as_ref()
            .map(|session| session.state)
            .unwrap_or_default()
    }

    /// Id of the current (recording or finalizing) session
    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|session| session.id)
    }

    /// Whether a session exists that has not been finalized yet
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn status(&self) -> ControllerStatus {
        let (buffered_fragments, buffered_bytes) = self
            .session
            .as_ref()
            .map(|session| (session.fragments.len(), session.fragments.total_bytes()))
            .unwrap_or((0, 0));

        ControllerStatus {
            state: self.state(),
            finalizing: self
                .session
                .as_ref()
                .map(|session| !session.is_recording())
                .unwrap_or(false),
            converting: self.in_flight.load(Ordering::SeqCst) > 0,
            buffered_fragments,
            buffered_bytes,
        }
    }

    /// Grab one still frame and save it
    ///
    /// Independent of the recording session. Returns the saved path, or
    /// `None` if anything failed (the failure is logged).
    pub fn capture_photo(&self) -> Option<PathBuf> {
        if !self.source.is_ready() {
            self.report(&AppError::StreamUnavailable(
                "Camera stream is not ready; photo skipped".to_string(),
            ));
            return None;
        }

        let format = self.settings.photo_format;
        let result = self
            .source
            .grab_still()
            .and_then(|frame| still::encode(&frame, format))
            .and_then(|blob| {
                let filename = timestamped_filename(PHOTO_KIND, format.extension());
                self.sink.save(&blob, &filename)
            });

        match result {
            Ok(path) => {
                tracing::info!("Photo saved to {}", path.display());
                let _ = self.event_tx.send(CaptureEvent::PhotoSaved { path: path.clone() });
                Some(path)
            }
            Err(e) => {
                self.report(&e);
                None
            }
        }
    }

    /// Start a new recording
    ///
    /// Ignored while recording, finalizing or converting. Returns whether a
    /// recorder is now running.
    pub fn start_recording(&mut self) -> bool {
        if let Some(reason) = self.busy_reason() {
            tracing::warn!("Ignoring start request: {}", reason);
            return false;
        }

        let session = RecordingSession::new(&self.settings.recording_mime);
        let options = RecorderOptions {
            session_id: session.id,
            mime_type: session.mime_type.clone(),
            events: self.recorder_tx.clone(),
        };

        let started = self
            .recorders
            .create(self.source.clone(), options)
            .and_then(|mut recorder| {
                recorder.start()?;
                Ok(recorder)
            });

        match started {
            Ok(recorder) => {
                tracing::info!(
                    "Recording started (session {}, {})",
                    session.id,
                    recorder.mime_type()
                );
                let _ = self.event_tx.send(CaptureEvent::RecordingStarted {
                    session_id: session.id,
                });
                self.session = Some(session);
                self.recorder = Some(recorder);
                true
            }
            Err(e) => {
                // The session is dropped here, so the state stays Idle
                tracing::error!(code = e.code(), "Error starting capture: {}", e);
                let _ = self.event_tx.send(CaptureEvent::Failed {
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
                false
            }
        }
    }

    /// Buffer a fragment delivered by the recorder of `session_id`
    pub fn on_fragment(&mut self, session_id: Uuid, data: Bytes) {
        let Some(session) = self.session.as_mut().filter(|s| s.id == session_id) else {
            tracing::debug!("Dropping {} bytes for stale session {}", data.len(), session_id);
            return;
        };

        let size = data.len();
        if session.fragments.push(data) {
            tracing::trace!(
                "Buffered fragment of {} bytes ({} total)",
                size,
                session.fragments.total_bytes()
            );
        } else {
            tracing::debug!("Discarding empty fragment");
        }
    }

    /// Ask the recorder to finalize and return to Idle right away
    ///
    /// The recording is saved once the recorder reports that it stopped.
    pub fn stop_recording(&mut self) {
        let Some(session) = self.session.as_mut().filter(|s| s.is_recording()) else {
            tracing::debug!("Stop requested while not recording");
            return;
        };

        session.stop();
        let session_id = session.id;
        tracing::info!("Recording stopped after {}ms", session.duration_ms());
        let _ = self.event_tx.send(CaptureEvent::RecordingStopped { session_id });

        let stopped = match self.recorder.as_mut() {
            Some(recorder) => recorder.stop(),
            None => Err(AppError::InvalidState("No active recorder".to_string())),
        };

        if let Err(e) = stopped {
            // No stop notification will come; drop what was buffered
            self.report(&e);
            self.session = None;
            self.recorder = None;
        }
    }

    /// Start or stop depending on the current state
    pub fn toggle_recording(&mut self) {
        if self.state() == RecordingState::Recording {
            self.stop_recording();
        } else {
            self.start_recording();
        }
    }

    /// Apply one recorder event
    ///
    /// Returns the save job once the recorder of the current session stops.
    pub fn handle_recorder_event(&mut self, event: RecorderEvent) -> Option<SaveJob> {
        match event {
            RecorderEvent::Data { session, data } => {
                self.on_fragment(session, data);
                None
            }
            RecorderEvent::Error { session, message } => {
                if self.session_id() == Some(session) {
                    self.report(&AppError::Recorder(message));
                    // The buffered data is still saved once the recorder stops
                    if let Some(current) = self.session.as_mut().filter(|s| s.is_recording()) {
                        current.stop();
                        let _ = self.event_tx.send(CaptureEvent::RecordingStopped { session_id: session });
                    }
                } else {
                    tracing::debug!("Ignoring error from stale recorder {}: {}", session, message);
                }
                None
            }
            RecorderEvent::Stopped { session } => {
                if self.session_id() != Some(session) {
                    tracing::debug!("Ignoring stop notification from stale recorder {}", session);
                    return None;
                }
                if let Some(current) = self.session.as_mut() {
                    current.stop();
                }
                self.finalize()
            }
        }
    }

    /// Assemble the buffered fragments into a save job
    ///
    /// Ends the session either way; returns `None` if nothing was recorded.
    pub fn finalize(&mut self) -> Option<SaveJob> {
        let mut session = self.session.take()?;
        self.recorder = None;

        let Some(blob) = session.fragments.assemble(&session.mime_type) else {
            tracing::info!("Recording {} produced no data; nothing to save", session.id);
            return None;
        };

        let recorded_as = ContainerFormat::from_mime(&session.mime_type).unwrap_or(ContainerFormat::Webm);
        let conversion = match (&self.transcoder, self.settings.convert_to) {
            (Some(transcoder), Some(target)) => Some((transcoder.clone(), target)),
            (None, Some(target)) => {
                tracing::warn!("No transcoder available; saving as {} instead of {}", recorded_as, target);
                None
            }
            _ => None,
        };

        tracing::info!("Assembled recording {}: {} bytes", session.id, blob.len());
        Some(SaveJob {
            blob,
            recorded_as,
            conversion,
            sink: self.sink.clone(),
            events: self.event_tx.clone(),
            _guard: InFlightGuard::new(self.in_flight.clone()),
        })
    }

    /// Finalize the session and run its save job to completion
    pub async fn finalize_and_save(&mut self) -> Option<PathBuf> {
        self.finalize()?.run().await
    }

    fn busy_reason(&self) -> Option<&'static str> {
        match &self.session {
            Some(session) if session.is_recording() => Some("already recording"),
            Some(_) => Some("previous recording is still finalizing"),
            None if self.in_flight.load(Ordering::SeqCst) > 0 => {
                Some("previous recording is still converting")
            }
            None => None,
        }
    }

    fn report(&self, error: &AppError) {
        report_failure(&self.event_tx, error);
    }
}

fn report_failure(events: &broadcast::Sender<CaptureEvent>, error: &AppError) {
    match error {
        AppError::StreamUnavailable(_) => tracing::warn!(code = error.code(), "{}", error),
        _ => tracing::error!(code = error.code(), "{}", error),
    }
    let _ = events.send(CaptureEvent::Failed {
        code: error.code().to_string(),
        message: error.to_string(),
    });
}

/// Keeps the in-flight counter raised for the lifetime of a save job
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An assembled recording on its way to the save sink
pub struct SaveJob {
    blob: MediaBlob,
    recorded_as: ContainerFormat,
    conversion: Option<(Arc<dyn Transcoder>, ContainerFormat)>,
    sink: Arc<dyn SaveSink>,
    events: broadcast::Sender<CaptureEvent>,
    _guard: InFlightGuard,
}

impl SaveJob {
    /// The assembled recording
    pub fn blob(&self) -> &MediaBlob {
        &self.blob
    }

    /// Convert (if configured) and save; returns the saved path
    pub async fn run(self) -> Option<PathBuf> {
        let (blob, extension) = match self.conversion {
            Some((transcoder, target)) => {
                tracing::info!("Converting recording to {}...", target);
                let _ = self.events.send(CaptureEvent::Converting { target });

                match transcoder.transcode(self.blob, target).await {
                    Ok(converted) => (converted, target.extension()),
                    Err(e) => {
                        // Nothing is saved when conversion fails
                        report_failure(&self.events, &e);
                        return None;
                    }
                }
            }
            None => (self.blob, self.recorded_as.extension()),
        };

        let filename = timestamped_filename(RECORDING_KIND, extension);
        let bytes = blob.len();
        let sink = self.sink.clone();

        // Sinks do blocking file I/O; keep it off the controller task
        let saved = tokio::task::spawn_blocking(move || sink.save(&blob, &filename))
            .await
            .unwrap_or_else(|e| Err(AppError::Save(format!("Save task failed: {}", e))));

        match saved {
            Ok(path) => {
                let _ = self.events.send(CaptureEvent::RecordingSaved {
                    path: path.clone(),
                    bytes,
                });
                Some(path)
            }
            Err(e) => {
                report_failure(&self.events, &e);
                None
            }
        }
    }
}
