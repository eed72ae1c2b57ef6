//! Track capture
//!
//! Media types for live tracks, the sources that produce them, slot
//! computation, and frame acquisition feeding the compositor.

pub mod acquisition;
pub mod feed;
pub mod slots;
pub mod traits;

pub use acquisition::{FrameAcquisition, FrameSink};
pub use feed::{AudioFeed, FeedSource, TestPatternSource, ToneSource};
pub use slots::{audio_tracks, compute_slots, frame_key, Participant, SlotMetadata, TrackSlot};
pub use traits::{AudioChunk, AudioSampleSource, AudioTrack, VideoFrame, VideoFrameSource, VideoTrack};
