//! Media recorder traits
//!
//! A recorder is bound to a live source, encodes it into a container and
//! delivers the result as fragments over an event channel. It announces the
//! end of its output with [`RecorderEvent::Stopped`].

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::capture::LiveSource;
use crate::utils::error::AppResult;

/// Events emitted by a recorder
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// A chunk of encoded media is ready
    Data { session: Uuid, data: Bytes },
    /// The recorder failed; `Stopped` follows
    Error { session: Uuid, message: String },
    /// The recorder has flushed its last fragment
    Stopped { session: Uuid },
}

impl RecorderEvent {
    /// Session the event belongs to
    pub fn session(&self) -> Uuid {
        match self {
            RecorderEvent::Data { session, .. }
            | RecorderEvent::Error { session, .. }
            | RecorderEvent::Stopped { session } => *session,
        }
    }
}

/// Everything a recorder needs besides the source
#[derive(Debug, Clone)]
pub struct RecorderOptions {
    /// Session the recorder's events are tagged with
    pub session_id: Uuid,

    /// Requested container/codec mime type
    pub mime_type: String,

    /// Where fragments and lifecycle events are delivered
    pub events: UnboundedSender<RecorderEvent>,
}

/// A single-use recorder
pub trait MediaRecorder: Send {
    /// Mime type of the fragments this recorder produces
    fn mime_type(&self) -> &str;

    /// Begin recording
    fn start(&mut self) -> AppResult<()>;

    /// Ask the recorder to finalize
    ///
    /// Returns once the request is made; the final fragments and
    /// [`RecorderEvent::Stopped`] arrive asynchronously.
    fn stop(&mut self) -> AppResult<()>;

    /// Whether currently recording
    fn is_recording(&self) -> bool;
}

/// Builds recorders bound to a live source
pub trait RecorderFactory: Send + Sync {
    /// Construct a recorder; fails for unsupported mime types or an unusable source
    fn create(
        &self,
        source: Arc<dyn LiveSource>,
        options: RecorderOptions,
    ) -> AppResult<Box<dyn MediaRecorder>>;
}
