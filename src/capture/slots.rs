//! Participants and compositor slots
//!
//! Slots are recomputed from the participant list on every membership
//! change (join, leave, mute, unmute) and are never persisted.

use super::traits::{AudioTrack, VideoTrack};
use serde::{Deserialize, Serialize};

/// Suffix distinguishing a participant's screen share from their camera
pub const SCREEN_SHARE_SUFFIX: &str = "-screenshare";

/// A meeting participant and their published tracks
#[derive(Debug, Clone, Default)]
pub struct Participant {
    /// Stable identity
    pub identity: String,

    /// Resolved display name, if any
    pub name: Option<String>,

    /// Whether the participant is currently speaking
    pub is_speaking: bool,

    pub camera: Option<VideoTrack>,
    pub screen_share: Option<VideoTrack>,
    pub microphone: Option<AudioTrack>,
    pub screen_share_audio: Option<AudioTrack>,
}

impl Participant {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            ..Default::default()
        }
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.identity)
    }
}

/// Frame-cache key for a participant's camera or screen share
pub fn frame_key(identity: &str, is_screen_share: bool) -> String {
    if is_screen_share {
        format!("{identity}{SCREEN_SHARE_SUFFIX}")
    } else {
        identity.to_string()
    }
}

/// One compositor input position
#[derive(Debug, Clone)]
pub struct TrackSlot {
    /// Frame-cache key
    pub key: String,
    pub participant_identity: String,
    pub name: String,
    /// Live track, absent when unpublished
    pub track: Option<VideoTrack>,
    pub is_screen_share: bool,
    pub is_speaking: bool,
    /// Ordinal used for colour and position assignment
    pub index: usize,
}

impl TrackSlot {
    /// Whether frames should be pulled for this slot
    pub fn has_live_video(&self) -> bool {
        self.track.as_ref().is_some_and(|t| !t.muted)
    }

    pub fn metadata(&self) -> SlotMetadata {
        SlotMetadata {
            key: self.key.clone(),
            name: self.name.clone(),
            is_screen_share: self.is_screen_share,
            is_speaking: self.is_speaking,
            has_video: self.has_live_video(),
            index: self.index,
        }
    }
}

/// Lightweight per-slot data handed to the compositor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotMetadata {
    pub key: String,
    pub name: String,
    pub is_screen_share: bool,
    pub is_speaking: bool,
    pub has_video: bool,
    pub index: usize,
}

/// Build slots in participant order: a camera slot for everyone, plus a
/// screen-share slot for anyone sharing.
pub fn compute_slots(participants: &[Participant]) -> Vec<TrackSlot> {
    let mut slots = Vec::with_capacity(participants.len());

    for (index, participant) in participants.iter().enumerate() {
        let name = participant.display_name().to_string();

        slots.push(TrackSlot {
            key: frame_key(&participant.identity, false),
            participant_identity: participant.identity.clone(),
            name: name.clone(),
            track: participant.camera.clone(),
            is_screen_share: false,
            is_speaking: participant.is_speaking,
            index,
        });

        if let Some(share) = &participant.screen_share {
            slots.push(TrackSlot {
                key: frame_key(&participant.identity, true),
                participant_identity: participant.identity.clone(),
                name: format!("{name} (Screen)"),
                track: Some(share.clone()),
                is_screen_share: true,
                is_speaking: false,
                index,
            });
        }
    }

    slots
}

/// Audio tracks that should feed the mixer
pub fn audio_tracks(participants: &[Participant]) -> Vec<AudioTrack> {
    participants
        .iter()
        .flat_map(|p| [p.microphone.as_ref(), p.screen_share_audio.as_ref()])
        .flatten()
        .filter(|t| !t.muted)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::feed::{AudioFeed, FeedSource};

    fn with_camera(identity: &str) -> Participant {
        let mut p = Participant::new(identity);
        p.camera = Some(VideoTrack::new(format!("{identity}-cam"), FeedSource::new()));
        p
    }

    #[test]
    fn test_frame_keys() {
        assert_eq!(frame_key("alice", false), "alice");
        assert_eq!(frame_key("alice", true), "alice-screenshare");
    }

    #[test]
    fn test_slots_follow_participant_order() {
        let mut bob = with_camera("bob");
        bob.screen_share = Some(VideoTrack::new("bob-share", FeedSource::new()));
        let participants = vec![with_camera("alice"), bob, Participant::new("carol")];

        let slots = compute_slots(&participants);
        let keys: Vec<_> = slots.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, ["alice", "bob", "bob-screenshare", "carol"]);
        assert_eq!(slots[2].index, 1);
        assert!(slots[2].is_screen_share);
        assert!(!slots[3].has_live_video());
    }

    #[test]
    fn test_muted_camera_has_no_live_video() {
        let mut p = Participant::new("dave");
        p.camera = Some(VideoTrack::new("dave-cam", FeedSource::new()).muted(true));
        assert!(!compute_slots(&[p])[0].has_live_video());
    }

    #[test]
    fn test_display_name_falls_back_to_identity() {
        let mut p = Participant::new("erin");
        p.name = Some("  ".into());
        assert_eq!(p.display_name(), "erin");
    }

    #[test]
    fn test_audio_tracks_skip_muted() {
        let mut a = Participant::new("a");
        a.microphone = Some(AudioTrack::new("a-mic", AudioFeed::new()));
        let mut b = Participant::new("b");
        b.microphone = Some(AudioTrack::new("b-mic", AudioFeed::new()).muted(true));
        let tracks = audio_tracks(&[a, b]);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, "a-mic");
    }
}
