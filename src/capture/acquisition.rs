//! Frame acquisition
//!
//! Pulls decoded frames from every eligible live track and forwards each one
//! to a [`FrameSink`] under the slot's frame-cache key. Nothing is queued
//! here: a frame is handed on as soon as it arrives and the sink keeps only
//! the latest one per key.

use super::slots::TrackSlot;
use super::traits::VideoFrame;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Receiver of acquired frames
pub trait FrameSink: Send + Sync {
    fn push_frame(&self, key: &str, frame: VideoFrame);
}

struct Capture {
    track_id: String,
    task: JoinHandle<()>,
}

/// Per-track capture tasks keyed by frame-cache key
pub struct FrameAcquisition {
    sink: Arc<dyn FrameSink>,
    captures: HashMap<String, Capture>,
}

impl FrameAcquisition {
    pub fn new(sink: Arc<dyn FrameSink>) -> Self {
        Self {
            sink,
            captures: HashMap::new(),
        }
    }

    /// Stop captures for tracks that went away and start captures for newly
    /// eligible ones. Captures whose track is unchanged keep running.
    pub fn reconcile(&mut self, slots: &[TrackSlot]) {
        let wanted: HashMap<&str, &TrackSlot> = slots
            .iter()
            .filter(|s| s.has_live_video())
            .map(|s| (s.key.as_str(), s))
            .collect();

        let stale: Vec<String> = self
            .captures
            .iter()
            .filter(|(key, capture)| {
                wanted
                    .get(key.as_str())
                    .and_then(|slot| slot.track.as_ref())
                    .map_or(true, |track| track.id != capture.track_id)
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in stale {
            if let Some(capture) = self.captures.remove(&key) {
                capture.task.abort();
                tracing::debug!("Stopped frame capture for {} (track {})", key, capture.track_id);
            }
        }

        for (key, slot) in wanted {
            if self.captures.contains_key(key) {
                continue;
            }
            let Some(track) = slot.track.as_ref() else {
                continue;
            };

            let mut frames = track.source.open();
            let sink = self.sink.clone();
            let frame_key = key.to_string();
            let task = tokio::spawn(async move {
                while let Some(frame) = frames.recv().await {
                    sink.push_frame(&frame_key, frame);
                }
            });

            tracing::debug!("Started frame capture for {} (track {})", key, track.id);
            self.captures.insert(
                key.to_string(),
                Capture {
                    track_id: track.id.clone(),
                    task,
                },
            );
        }
    }

    pub fn active_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.captures.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn stop_all(&mut self) {
        for (_, capture) in self.captures.drain() {
            capture.task.abort();
        }
    }
}

impl Drop for FrameAcquisition {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::feed::FeedSource;
    use crate::capture::slots::{compute_slots, Participant};
    use crate::capture::traits::VideoTrack;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<(String, u64)>>,
    }

    impl FrameSink for RecordingSink {
        fn push_frame(&self, key: &str, frame: VideoFrame) {
            self.seen.lock().push((key.to_string(), frame.timestamp_us()));
            frame.close();
        }
    }

    #[tokio::test]
    async fn test_reconcile_starts_and_stops_captures() {
        let sink = Arc::new(RecordingSink::default());
        let mut acquisition = FrameAcquisition::new(sink.clone());

        let feed = FeedSource::new();
        let mut alice = Participant::new("alice");
        alice.camera = Some(VideoTrack::new("cam-1", feed.clone()));
        alice.screen_share = Some(VideoTrack::new("share-1", FeedSource::new()));
        let bob = Participant::new("bob");

        acquisition.reconcile(&compute_slots(&[alice.clone(), bob]));
        assert_eq!(acquisition.active_keys(), ["alice", "alice-screenshare"]);

        assert!(feed.push(VideoFrame::solid(1, 1, [0; 4], 7)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sink.seen.lock().as_slice(), [("alice".to_string(), 7)]);

        alice.screen_share = None;
        alice.camera = alice.camera.map(|t| t.muted(true));
        acquisition.reconcile(&compute_slots(&[alice]));
        assert!(acquisition.active_keys().is_empty());
    }

    #[tokio::test]
    async fn test_replaced_track_restarts_capture() {
        let sink = Arc::new(RecordingSink::default());
        let mut acquisition = FrameAcquisition::new(sink.clone());

        let mut p = Participant::new("p");
        p.camera = Some(VideoTrack::new("old", FeedSource::new()));
        acquisition.reconcile(&compute_slots(&[p.clone()]));

        let replacement = FeedSource::new();
        p.camera = Some(VideoTrack::new("new", replacement.clone()));
        acquisition.reconcile(&compute_slots(&[p]));
        assert!(replacement.has_reader());
        assert_eq!(acquisition.active_keys(), ["p"]);
    }
}
