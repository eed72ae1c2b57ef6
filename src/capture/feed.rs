//! Track sources
//!
//! Push-fed sources let a host hand decoded frames and PCM to the recorder.
//! Test-pattern and tone sources generate media on their own and are used by
//! the demo binary and the tests.

use super::traits::{AudioChunk, AudioSampleSource, VideoFrame, VideoFrameSource};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const FEED_CAPACITY: usize = 4;

/// Video source fed by the host
#[derive(Default)]
pub struct FeedSource {
    subscriber: Mutex<Option<mpsc::Sender<VideoFrame>>>,
}

impl FeedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Offer a frame to the current reader.
    ///
    /// Returns false when nobody is reading or the reader is behind; the frame
    /// is released in that case.
    pub fn push(&self, frame: VideoFrame) -> bool {
        let guard = self.subscriber.lock();
        match guard.as_ref() {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        }
    }

    pub fn has_reader(&self) -> bool {
        self.subscriber.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

impl VideoFrameSource for FeedSource {
    fn open(&self) -> mpsc::Receiver<VideoFrame> {
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        *self.subscriber.lock() = Some(tx);
        rx
    }
}

/// Audio source fed by the host
#[derive(Default)]
pub struct AudioFeed {
    subscriber: Mutex<Option<mpsc::Sender<AudioChunk>>>,
}

impl AudioFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, chunk: AudioChunk) -> bool {
        let guard = self.subscriber.lock();
        match guard.as_ref() {
            Some(tx) => tx.try_send(chunk).is_ok(),
            None => false,
        }
    }
}

impl AudioSampleSource for AudioFeed {
    fn open(&self) -> mpsc::Receiver<AudioChunk> {
        let (tx, rx) = mpsc::channel(FEED_CAPACITY * 8);
        *self.subscriber.lock() = Some(tx);
        rx
    }
}

/// Generates a coloured frame with a sweeping bar at a fixed rate
pub struct TestPatternSource {
    width: u32,
    height: u32,
    fps: u32,
    color: [u8; 4],
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32, fps: u32, color: [u8; 4]) -> Arc<Self> {
        Arc::new(Self {
            width,
            height,
            fps: fps.max(1),
            color,
        })
    }

    fn render(&self, index: u64) -> VideoFrame {
        let (w, h) = (self.width, self.height);
        let mut pixels = vec![0u8; (w * h * 4) as usize];
        let bar_width = (w / 10).max(1);
        let bar_x = ((index * 8) % w as u64) as u32;

        for y in 0..h {
            for x in 0..w {
                let idx = ((y * w + x) * 4) as usize;
                let in_bar = x >= bar_x && x < bar_x + bar_width;
                let px = if in_bar { [255, 255, 255, 255] } else { self.color };
                pixels[idx..idx + 4].copy_from_slice(&px);
            }
        }

        let timestamp_us = index * 1_000_000 / self.fps as u64;
        VideoFrame::new(w, h, pixels, timestamp_us)
    }
}

impl VideoFrameSource for TestPatternSource {
    fn open(&self) -> mpsc::Receiver<VideoFrame> {
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        let pattern = TestPatternSource {
            width: self.width,
            height: self.height,
            fps: self.fps,
            color: self.color,
        };
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1) / pattern.fps);
            let mut index = 0u64;
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                // A full queue means the reader only wants the newest frames.
                let _ = tx.try_send(pattern.render(index));
                index += 1;
            }
        });
        rx
    }
}

/// Generates a sine tone
pub struct ToneSource {
    frequency: f32,
    amplitude: f32,
    sample_rate: u32,
    channels: u16,
    period: Duration,
}

impl ToneSource {
    pub fn new(frequency: f32, amplitude: f32, sample_rate: u32, channels: u16) -> Arc<Self> {
        Arc::new(Self {
            frequency,
            amplitude,
            sample_rate,
            channels: channels.max(1),
            period: Duration::from_millis(20),
        })
    }
}

impl AudioSampleSource for ToneSource {
    fn open(&self) -> mpsc::Receiver<AudioChunk> {
        let (tx, rx) = mpsc::channel(FEED_CAPACITY * 8);
        let (frequency, amplitude) = (self.frequency, self.amplitude);
        let (sample_rate, channels, period) = (self.sample_rate, self.channels, self.period);
        let frames_per_chunk = (sample_rate as u128 * period.as_millis() / 1000) as usize;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut phase = 0u64;
            loop {
                ticker.tick().await;
                let mut samples = Vec::with_capacity(frames_per_chunk * channels as usize);
                for _ in 0..frames_per_chunk {
                    let t = phase as f32 / sample_rate as f32;
                    let value = (t * frequency * std::f32::consts::TAU).sin() * amplitude;
                    samples.extend(std::iter::repeat(value).take(channels as usize));
                    phase += 1;
                }
                let chunk = AudioChunk {
                    samples,
                    sample_rate,
                    channels,
                };
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });
        rx
    }
}
