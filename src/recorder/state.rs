//! Recording state management
//!
//! Defines the recording state machine, the session record and the events
//! broadcast to subscribers.

use crate::encoder::ContainerFormat;
use crate::storage::backing_file_name;
use crate::utils::ErrorResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// Current state of the recording system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No recording in progress
    #[default]
    Idle,
    /// Pipeline is being set up
    Starting,
    /// Encoder is running and chunks are being stored
    Recording,
    /// Encoder stopped, storage being finalized
    Stopping,
}

impl RecordingState {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// One recording attempt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    pub id: String,
    pub mime_type: String,
    pub extension: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip)]
    clock: Instant,
}

impl RecordingSession {
    /// Create a session starting now
    pub fn new(format: &ContainerFormat) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            mime_type: format.mime_type.to_string(),
            extension: format.extension.to_string(),
            started_at: Utc::now(),
            clock: Instant::now(),
        }
    }

    /// Name of the file backing this session in the storage root
    pub fn backing_file_name(&self) -> String {
        backing_file_name(&self.id, &self.extension)
    }

    pub fn duration_ms(&self) -> u64 {
        self.clock.elapsed().as_millis() as u64
    }
}

/// Events emitted during recording
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "data")]
pub enum RecordingEvent {
    /// Recording started
    Started { session_id: String },
    /// Recording stopped and the artifact is ready (or nothing was recorded)
    Stopped,
    /// Duration update in milliseconds
    Progress(u64),
    /// A user-visible failure
    Error(ErrorResponse),
    /// A chunk reached storage
    ChunkWritten { index: u64, bytes: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::PREFERRED_FORMATS;

    #[test]
    fn test_session_file_name() {
        let session = RecordingSession::new(&PREFERRED_FORMATS[0]);
        let name = session.backing_file_name();
        assert!(name.starts_with("recording-"));
        assert!(name.ends_with(".webm"));
        assert!(name.contains(&session.id));
    }

    #[test]
    fn test_sessions_are_unique() {
        let a = RecordingSession::new(&PREFERRED_FORMATS[0]);
        let b = RecordingSession::new(&PREFERRED_FORMATS[0]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(serde_json::to_string(&RecordingState::Stopping).unwrap(), "\"stopping\"");
        assert!(!RecordingState::default().is_active());
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(RecordingEvent::ChunkWritten { index: 3, bytes: 10 }).unwrap();
        assert_eq!(json["type"], "chunkWritten");
        assert_eq!(json["data"]["index"], 3);
    }
}
