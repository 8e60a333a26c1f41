//! Recording state management
//!
//! Defines the recording state machine, session tracking and the ordered
//! fragment buffer a session accumulates.

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::media::MediaBlob;

/// Current state of the recording system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No recording in progress
    #[default]
    Idle,
    /// Currently recording
    Recording,
}

/// Fragments of one recording, kept in arrival order
#[derive(Debug, Default)]
pub struct FragmentBuffer {
    fragments: Vec<Bytes>,
    total_bytes: usize,
}

impl FragmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment; empty fragments are dropped
    ///
    /// Returns whether the fragment was kept.
    pub fn push(&mut self, fragment: Bytes) -> bool {
        if fragment.is_empty() {
            return false;
        }
        self.total_bytes += fragment.len();
        self.fragments.push(fragment);
        true
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Drain every fragment into one blob tagged with `mime`
    ///
    /// The buffer is left empty. Returns `None` if nothing was buffered.
    pub fn assemble(&mut self, mime: &str) -> Option<MediaBlob> {
        if self.fragments.is_empty() {
            return None;
        }

        let mut assembled = BytesMut::with_capacity(self.total_bytes);
        for fragment in self.fragments.drain(..) {
            assembled.extend_from_slice(&fragment);
        }
        self.total_bytes = 0;

        Some(MediaBlob::new(assembled.freeze(), mime))
    }
}

/// One start-to-stop recording
#[derive(Debug)]
pub struct RecordingSession {
    /// Identifies events belonging to this session
    pub id: Uuid,

    /// Mime type requested from the recorder
    pub mime_type: String,

    pub state: RecordingState,

    /// Unix timestamp when the session started
    pub started_at: DateTime<Utc>,

    /// Unix timestamp when stop was requested
    pub stopped_at: Option<DateTime<Utc>>,

    pub fragments: FragmentBuffer,
}

impl RecordingSession {
    /// Create a new session starting now
    pub fn new(mime_type: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            mime_type: mime_type.to_string(),
            state: RecordingState::Recording,
            started_at: Utc::now(),
            stopped_at: None,
            fragments: FragmentBuffer::new(),
        }
    }

    /// End the session; late fragments are still accepted until finalize
    pub fn stop(&mut self) {
        if self.state == RecordingState::Recording {
            self.state = RecordingState::Idle;
            self.stopped_at = Some(Utc::now());
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    /// Duration of the session in milliseconds
    pub fn duration_ms(&self) -> i64 {
        let end = self.stopped_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds()
    }
}

/// Snapshot of the controller reported to front ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
    pub state: RecordingState,

    /// Stop was requested and the recorder has not finished yet
    pub finalizing: bool,

    /// A conversion/save job is still running
    pub converting: bool,

    pub buffered_fragments: usize,
    pub buffered_bytes: usize,
}
