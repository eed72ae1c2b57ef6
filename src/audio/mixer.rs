//! Audio mixer
//!
//! Each connected track feeds a sample queue. A fixed-period tick drains one
//! period's worth of samples from every queue, sums them and emits the mix.
//! The output never stalls: inputs that are behind contribute silence, and
//! with no inputs at all the mixer emits pure silence so the encoder always
//! has an audio clock. Inputs at another sample rate are linearly resampled
//! to the mixer rate before they are queued.

use crate::capture::{AudioChunk, AudioTrack};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Longest backlog kept per input before the oldest samples are dropped
const MAX_QUEUE_SECONDS: usize = 2;
const OUTPUT_CAPACITY: usize = 64;

/// Drain `len` interleaved samples from every input and sum them.
///
/// Inputs shorter than `len` are padded with silence; the result is clamped
/// to [-1.0, 1.0].
pub fn mix_frames<'a>(inputs: impl IntoIterator<Item = &'a mut VecDeque<f32>>, len: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; len];
    for queue in inputs {
        let take = queue.len().min(len);
        for (slot, sample) in out.iter_mut().zip(queue.drain(..take)) {
            *slot += sample;
        }
    }
    for sample in &mut out {
        *sample = sample.clamp(-1.0, 1.0);
    }
    out
}

/// Convert interleaved samples between channel layouts
fn remix(chunk: AudioChunk, channels: u16) -> Vec<f32> {
    if chunk.channels == channels || chunk.channels == 0 {
        return chunk.samples;
    }
    let (from, to) = (chunk.channels as usize, channels as usize);
    let mut out = Vec::with_capacity(chunk.frames() * to);
    for frame in chunk.samples.chunks_exact(from) {
        if from == 1 {
            out.extend(std::iter::repeat(frame[0]).take(to));
        } else if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            out.extend((0..to).map(|c| frame[c.min(from - 1)]));
        }
    }
    out
}

/// Linear sample-rate converter for one input.
///
/// The last frame of each chunk is carried into the next one, so the output
/// stays continuous across chunk boundaries.
struct Resampler {
    from: u32,
    to: u32,
    channels: usize,
    /// Read position in frames, relative to the carried frame
    position: f64,
    carried: Vec<f32>,
}

impl Resampler {
    fn new(from: u32, to: u32, channels: u16) -> Self {
        Self {
            from,
            to,
            channels: channels.max(1) as usize,
            position: 0.0,
            carried: Vec::new(),
        }
    }

    fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let ch = self.channels;
        let step = self.from as f64 / self.to as f64;

        let mut buffer = std::mem::take(&mut self.carried);
        buffer.extend_from_slice(samples);
        let frames = buffer.len() / ch;
        if frames == 0 {
            return Vec::new();
        }

        let mut out = Vec::with_capacity(((frames as f64 / step) as usize + 1) * ch);
        loop {
            let i = self.position as usize;
            if i + 1 >= frames {
                break;
            }
            let frac = (self.position - i as f64) as f32;
            for c in 0..ch {
                let a = buffer[i * ch + c];
                let b = buffer[(i + 1) * ch + c];
                out.push(a + (b - a) * frac);
            }
            self.position += step;
        }

        self.position -= (frames - 1) as f64;
        self.carried = buffer[(frames - 1) * ch..frames * ch].to_vec();
        out
    }
}

type Graph = Arc<Mutex<HashMap<String, VecDeque<f32>>>>;

pub struct AudioMixer {
    sample_rate: u32,
    channels: u16,
    graph: Graph,
    inputs: HashMap<String, JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
}

impl AudioMixer {
    /// Start the mixing clock. The receiver yields one chunk per `period`.
    pub fn start(sample_rate: u32, channels: u16, period: Duration) -> (Self, mpsc::Receiver<AudioChunk>) {
        let channels = channels.max(1);
        let (tx, rx) = mpsc::channel(OUTPUT_CAPACITY);
        let graph: Graph = Arc::new(Mutex::new(HashMap::new()));

        let frames_per_tick = (sample_rate as u128 * period.as_micros() / 1_000_000).max(1) as usize;
        let samples_per_tick = frames_per_tick * channels as usize;

        let tick_graph = graph.clone();
        let ticker = tokio::spawn(async move {
            let mut clock = interval(period);
            clock.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                clock.tick().await;
                let samples = {
                    let mut graph = tick_graph.lock();
                    mix_frames(graph.values_mut(), samples_per_tick)
                };
                let chunk = AudioChunk {
                    samples,
                    sample_rate,
                    channels,
                };
                if tx.send(chunk).await.is_err() {
                    tracing::debug!("Mixer output closed");
                    break;
                }
            }
        });

        tracing::info!(
            "Audio mixer started: {} Hz, {} ch, {} frames per tick",
            sample_rate,
            channels,
            frames_per_tick
        );

        let mixer = Self {
            sample_rate,
            channels,
            graph,
            inputs: HashMap::new(),
            ticker: Some(ticker),
        };
        (mixer, rx)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Add a track to the mix. Muted or already connected tracks are skipped.
    pub fn connect(&mut self, track: &AudioTrack) -> bool {
        if track.muted || self.inputs.contains_key(&track.id) {
            return false;
        }

        let id = track.id.clone();
        let graph = self.graph.clone();
        let channels = self.channels;
        let sample_rate = self.sample_rate;
        let max_queue = self.sample_rate as usize * channels as usize * MAX_QUEUE_SECONDS;
        let mut source = track.source.open();

        graph.lock().insert(id.clone(), VecDeque::new());
        let input_id = id.clone();
        let task = tokio::spawn(async move {
            let mut resampler: Option<Resampler> = None;
            while let Some(chunk) = source.recv().await {
                let rate = chunk.sample_rate;
                let mut samples = remix(chunk, channels);
                if rate != 0 && rate != sample_rate {
                    if resampler.as_ref().map_or(true, |r| r.from != rate) {
                        tracing::debug!("Resampling {} from {} Hz to {} Hz", input_id, rate, sample_rate);
                        resampler = Some(Resampler::new(rate, sample_rate, channels));
                    }
                    if let Some(resampler) = resampler.as_mut() {
                        samples = resampler.process(&samples);
                    }
                } else {
                    resampler = None;
                }
                let mut queues = graph.lock();
                let Some(queue) = queues.get_mut(&input_id) else {
                    break;
                };
                queue.extend(samples);
                if queue.len() > max_queue {
                    let excess = queue.len() - max_queue;
                    queue.drain(..excess);
                }
            }
        });

        tracing::debug!("Audio track {} connected", id);
        self.inputs.insert(id, task);
        true
    }

    pub fn disconnect(&mut self, track_id: &str) -> bool {
        let Some(task) = self.inputs.remove(track_id) else {
            return false;
        };
        task.abort();
        self.graph.lock().remove(track_id);
        tracing::debug!("Audio track {} disconnected", track_id);
        true
    }

    /// Make the connected set match `tracks`
    pub fn reconcile(&mut self, tracks: &[AudioTrack]) {
        let stale: Vec<String> = self
            .inputs
            .keys()
            .filter(|id| !tracks.iter().any(|t| &t.id == *id && !t.muted))
            .cloned()
            .collect();
        for id in stale {
            self.disconnect(&id);
        }
        for track in tracks {
            self.connect(track);
        }
    }

    pub fn connected(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inputs.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop the clock and drop every input
    pub fn stop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        for (_, task) in self.inputs.drain() {
            task.abort();
        }
        self.graph.lock().clear();
    }
}

impl Drop for AudioMixer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::AudioFeed;
    use tokio::time::timeout;

    #[test]
    fn test_mix_sums_and_pads() {
        let mut a: VecDeque<f32> = [0.25, 0.25, 0.25].into_iter().collect();
        let mut b: VecDeque<f32> = [0.5].into_iter().collect();
        let mixed = mix_frames([&mut a, &mut b], 4);
        assert_eq!(mixed, vec![0.75, 0.25, 0.25, 0.0]);
        assert!(a.is_empty());
        assert!(b.is_empty());
    }

    #[test]
    fn test_mix_clamps() {
        let mut a: VecDeque<f32> = [0.9, -0.9].into_iter().collect();
        let mut b: VecDeque<f32> = [0.9, -0.9].into_iter().collect();
        assert_eq!(mix_frames([&mut a, &mut b], 2), vec![1.0, -1.0]);
    }

    #[test]
    fn test_mix_leaves_backlog() {
        let mut a: VecDeque<f32> = (0..10).map(|i| i as f32 / 100.0).collect();
        let mixed = mix_frames([&mut a], 4);
        assert_eq!(mixed.len(), 4);
        assert_eq!(a.len(), 6);
    }

    #[test]
    fn test_remix_mono_to_stereo() {
        let chunk = AudioChunk {
            samples: vec![0.1, 0.2],
            sample_rate: 48000,
            channels: 1,
        };
        assert_eq!(remix(chunk, 2), vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_resampler_keeps_duration() {
        let mut resampler = Resampler::new(44100, 48000, 1);
        let mut produced = 0;
        for _ in 0..10 {
            let out = resampler.process(&[0.25; 4410]);
            assert!(out.iter().all(|s| (*s - 0.25).abs() < 1e-6));
            produced += out.len();
        }
        // One second in, one second out
        assert!((47_999..=48_001).contains(&produced), "produced {}", produced);
    }

    #[test]
    fn test_resampler_interpolates_across_chunks() {
        let mut resampler = Resampler::new(8000, 16000, 1);
        let mut out = resampler.process(&[0.0, 0.5]);
        out.extend(resampler.process(&[1.0]));
        assert_eq!(out, vec![0.0, 0.25, 0.5, 0.75]);
    }

    #[tokio::test]
    async fn test_mismatched_rate_is_resampled() {
        let (mut mixer, mut rx) = AudioMixer::start(8000, 1, Duration::from_millis(10));
        let feed = AudioFeed::new();
        assert!(mixer.connect(&AudioTrack::new("mic-hd", feed.clone())));

        // 20 ms at 16 kHz is 160 frames, which is 80 frames at the mixer rate
        feed.push(AudioChunk {
            samples: vec![0.5; 160],
            sample_rate: 16000,
            channels: 1,
        });

        let mut loud = 0;
        for _ in 0..30 {
            let chunk = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
            loud += chunk.samples.iter().filter(|s| **s > 0.4).count();
        }
        assert_eq!(loud, 80);
        mixer.stop();
    }

    #[tokio::test]
    async fn test_silence_without_inputs() {
        let (mut mixer, mut rx) = AudioMixer::start(8000, 2, Duration::from_millis(10));
        let chunk = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(chunk.frames(), 80);
        assert!(chunk.samples.iter().all(|s| *s == 0.0));
        mixer.stop();
    }

    #[tokio::test]
    async fn test_connected_feed_is_mixed() {
        let (mut mixer, mut rx) = AudioMixer::start(8000, 1, Duration::from_millis(10));
        let feed = AudioFeed::new();
        let track = AudioTrack::new("mic-1", feed.clone());
        assert!(mixer.connect(&track));
        assert!(!mixer.connect(&track));

        feed.push(AudioChunk {
            samples: vec![0.5; 80],
            sample_rate: 8000,
            channels: 1,
        });

        let mut heard = false;
        for _ in 0..50 {
            let chunk = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
            if chunk.samples.iter().any(|s| *s > 0.4) {
                heard = true;
                break;
            }
        }
        assert!(heard);

        assert!(mixer.disconnect("mic-1"));
        assert!(mixer.connected().is_empty());
    }

    #[tokio::test]
    async fn test_muted_tracks_are_skipped() {
        let (mut mixer, _rx) = AudioMixer::start(8000, 1, Duration::from_millis(10));
        let track = AudioTrack::new("mic-1", AudioFeed::new()).muted(true);
        assert!(!mixer.connect(&track));

        let live = AudioTrack::new("mic-2", AudioFeed::new());
        mixer.reconcile(&[track, live]);
        assert_eq!(mixer.connected(), vec!["mic-2".to_string()]);
    }
}
