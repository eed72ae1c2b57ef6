//! Capture trait definitions
//!
//! Platform-agnostic media types exchanged between live tracks, the
//! compositor and the audio mixer.

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// One decoded video frame (RGBA, tightly packed).
///
/// Frames may hold a scarce decoder resource. Whoever owns a frame is
/// responsible for calling [`VideoFrame::close`]; dropping it releases as well.
pub struct VideoFrame {
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
    timestamp_us: u64,
    release: Option<ReleaseHook>,
}

impl VideoFrame {
    /// Wrap RGBA pixels; `pixels.len()` must be `width * height * 4`
    pub fn new(width: u32, height: u32, pixels: impl Into<Arc<[u8]>>, timestamp_us: u64) -> Self {
        let pixels = pixels.into();
        debug_assert_eq!(pixels.len(), (width * height * 4) as usize);
        Self {
            width,
            height,
            pixels,
            timestamp_us,
            release: None,
        }
    }

    /// A frame filled with one colour
    pub fn solid(width: u32, height: u32, rgba: [u8; 4], timestamp_us: u64) -> Self {
        let pixels: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect();
        Self::new(width, height, pixels, timestamp_us)
    }

    /// Attach a hook run exactly once when the frame is released
    pub fn with_release(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(hook));
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    /// Release the frame's underlying resource
    pub fn close(mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

impl Drop for VideoFrame {
    fn drop(&mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp_us", &self.timestamp_us)
            .finish()
    }
}

/// Interleaved f32 PCM
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioChunk {
    pub fn silence(frames: usize, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: vec![0.0; frames * channels as usize],
            sample_rate,
            channels,
        }
    }

    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

/// Per-track decoded frame source.
///
/// `open` starts a new reader; the previous reader (if any) stops receiving.
/// Dropping the receiver ends the read.
pub trait VideoFrameSource: Send + Sync {
    fn open(&self) -> mpsc::Receiver<VideoFrame>;
}

/// Per-track PCM source, at the mixer's sample rate and channel count
pub trait AudioSampleSource: Send + Sync {
    fn open(&self) -> mpsc::Receiver<AudioChunk>;
}

/// A live video track (camera or screen share)
#[derive(Clone)]
pub struct VideoTrack {
    pub id: String,
    pub muted: bool,
    pub source: Arc<dyn VideoFrameSource>,
}

impl VideoTrack {
    pub fn new(id: impl Into<String>, source: Arc<dyn VideoFrameSource>) -> Self {
        Self {
            id: id.into(),
            muted: false,
            source,
        }
    }

    pub fn muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }
}

impl fmt::Debug for VideoTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoTrack")
            .field("id", &self.id)
            .field("muted", &self.muted)
            .finish()
    }
}

/// A live audio track (microphone or screen-share audio)
#[derive(Clone)]
pub struct AudioTrack {
    pub id: String,
    pub muted: bool,
    pub source: Arc<dyn AudioSampleSource>,
}

impl AudioTrack {
    pub fn new(id: impl Into<String>, source: Arc<dyn AudioSampleSource>) -> Self {
        Self {
            id: id.into(),
            muted: false,
            source,
        }
    }

    pub fn muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }
}

impl fmt::Debug for AudioTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioTrack")
            .field("id", &self.id)
            .field("muted", &self.muted)
            .finish()
    }
}
