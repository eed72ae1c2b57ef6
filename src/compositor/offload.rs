//! Compositor offload
//!
//! Runs the paint loop inside an isolated context so its cadence depends
//! only on its own timer. The host talks to it through [`CompositorMessage`]s
//! and receives painted frames on a bounded channel; when the consumer falls
//! behind, frames are dropped rather than queued.

use super::frame_cache::FrameCache;
use super::painter::{CompositeFrame, Compositor};
use super::state::{CompositorConfig, CompositorState};
use crate::capture::{FrameSink, VideoFrame};
use crate::utils::IsolatedContext;
use parking_lot::Mutex;
use std::io;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Messages accepted by the compositor context
#[derive(Debug)]
pub enum CompositorMessage {
    /// One-time surface handoff plus initial state
    Init {
        config: CompositorConfig,
        state: CompositorState,
    },
    /// Start the paint loop
    Render,
    UpdateState(CompositorState),
    /// Hand one decoded frame over; the context owns it from here
    UpdateFrame {
        participant_identity: String,
        frame: VideoFrame,
    },
    /// Halt the loop and release all cached frames
    Stop,
}

impl CompositorMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Render => "render",
            Self::UpdateState(_) => "updateState",
            Self::UpdateFrame { .. } => "updateFrame",
            Self::Stop => "stop",
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Message loop of the compositor context
pub async fn run_compositor_worker(
    mut inbox: mpsc::UnboundedReceiver<CompositorMessage>,
    output: mpsc::Sender<CompositeFrame>,
) {
    let mut compositor: Option<Compositor> = None;
    let mut state = CompositorState::default();
    let mut cache = FrameCache::new();
    let mut ticker: Option<Interval> = None;
    let mut started_at = Instant::now();
    let mut dropped: u64 = 0;

    loop {
        tokio::select! {
            message = inbox.recv() => {
                let Some(message) = message else {
                    tracing::debug!("Compositor inbox closed");
                    break;
                };
                match message {
                    CompositorMessage::Init { config, state: initial } => {
                        if compositor.is_some() {
                            tracing::warn!("Compositor already initialised, ignoring init");
                            continue;
                        }
                        tracing::info!(
                            "Compositor initialised at {}x{} @ {}fps",
                            config.width,
                            config.height,
                            config.fps
                        );
                        compositor = Some(Compositor::new(config));
                        state = initial;
                    }
                    CompositorMessage::Render => {
                        let Some(c) = compositor.as_ref() else {
                            tracing::warn!("Render requested before init");
                            continue;
                        };
                        if ticker.is_none() {
                            let period = Duration::from_secs_f64(1.0 / c.config().fps.max(1) as f64);
                            let mut t = interval(period);
                            t.set_missed_tick_behavior(MissedTickBehavior::Skip);
                            ticker = Some(t);
                            started_at = Instant::now();
                        }
                    }
                    CompositorMessage::UpdateState(next) => {
                        cache.retain_keys(next.slots.iter().map(|s| s.key.as_str()));
                        state = next;
                    }
                    CompositorMessage::UpdateFrame { participant_identity, frame } => {
                        cache.upsert(&participant_identity, frame);
                    }
                    CompositorMessage::Stop => {
                        tracing::info!("Compositor stopping, dropped {} frames", dropped);
                        break;
                    }
                }
            }
            _ = next_tick(&mut ticker) => {
                let Some(c) = compositor.as_mut() else {
                    continue;
                };
                let elapsed = started_at.elapsed().as_millis() as u64;
                let frame = c.render(&state, &cache, elapsed);
                match output.try_send(frame) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => dropped += 1,
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        tracing::debug!("Composite output closed, halting paint loop");
                        break;
                    }
                }
            }
        }
    }

    cache.release_all();
}

/// Host-side handle to the compositor context
pub struct CompositorOffload {
    inbox: mpsc::UnboundedSender<CompositorMessage>,
    context: Mutex<Option<IsolatedContext>>,
}

impl CompositorOffload {
    /// Start the compositor context; painted frames go to `output`
    pub fn spawn(output: mpsc::Sender<CompositeFrame>) -> io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let context = IsolatedContext::spawn("compositor", move || run_compositor_worker(rx, output))?;
        Ok(Self {
            inbox: tx,
            context: Mutex::new(Some(context)),
        })
    }

    fn send(&self, message: CompositorMessage) -> bool {
        let name = message.name();
        if self.inbox.send(message).is_err() {
            tracing::debug!("Compositor context gone, dropped '{}' message", name);
            return false;
        }
        true
    }

    pub fn init(&self, config: CompositorConfig, state: CompositorState) -> bool {
        self.send(CompositorMessage::Init { config, state })
    }

    pub fn render(&self) -> bool {
        self.send(CompositorMessage::Render)
    }

    pub fn update_state(&self, state: CompositorState) -> bool {
        self.send(CompositorMessage::UpdateState(state))
    }

    pub fn update_frame(&self, participant_identity: &str, frame: VideoFrame) -> bool {
        self.send(CompositorMessage::UpdateFrame {
            participant_identity: participant_identity.to_string(),
            frame,
        })
    }

    /// Halt the paint loop and wait for the context to release its frames
    pub fn stop(&self) {
        self.send(CompositorMessage::Stop);
        if let Some(context) = self.context.lock().take() {
            context.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.context.lock().as_ref().is_some_and(|c| c.is_running())
    }
}

impl FrameSink for CompositorOffload {
    fn push_frame(&self, key: &str, frame: VideoFrame) {
        self.update_frame(key, frame);
    }
}

impl Drop for CompositorOffload {
    fn drop(&mut self) {
        let _ = self.inbox.send(CompositorMessage::Stop);
        if let Some(context) = self.context.lock().take() {
            context.detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SlotMetadata;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::timeout;

    fn config() -> CompositorConfig {
        CompositorConfig {
            width: 64,
            height: 36,
            fps: 50,
            gap: 2,
            label_scale: 1,
            ..CompositorConfig::default()
        }
    }

    fn alice() -> SlotMetadata {
        SlotMetadata {
            key: "alice".to_string(),
            // No label, so the tile centre shows only video
            name: String::new(),
            is_screen_share: false,
            is_speaking: false,
            has_video: true,
            index: 0,
        }
    }

    async fn next_frame(rx: &mut mpsc::Receiver<CompositeFrame>) -> CompositeFrame {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("frame in time")
            .expect("channel open")
    }

    #[tokio::test]
    async fn test_paint_loop_emits_frames() {
        let (tx, mut rx) = mpsc::channel(2);
        let offload = CompositorOffload::spawn(tx).unwrap();
        offload.init(config(), CompositorState::default());
        offload.render();

        let a = next_frame(&mut rx).await;
        let b = next_frame(&mut rx).await;
        assert_eq!((a.width, a.height), (64, 36));
        assert!(b.sequence > a.sequence);
        offload.stop();
        assert!(!offload.is_running());
    }

    #[tokio::test]
    async fn test_nothing_painted_before_render() {
        let (tx, mut rx) = mpsc::channel(2);
        let offload = CompositorOffload::spawn(tx).unwrap();
        offload.init(config(), CompositorState::default());

        let waited = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(waited.is_err());
        offload.stop();
    }

    #[tokio::test]
    async fn test_stop_releases_cached_frames() {
        let released = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::channel(2);
        let offload = CompositorOffload::spawn(tx).unwrap();
        offload.init(config(), CompositorState::new(vec![alice()]));
        offload.render();

        let counter = released.clone();
        let frame = VideoFrame::solid(8, 8, [250, 0, 0, 255], 0).with_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        offload.push_frame("alice", frame);

        // Wait until the frame shows up in the output
        let mut seen = false;
        for _ in 0..50 {
            let frame = next_frame(&mut rx).await;
            let center = ((18 * 64 + 32) * 4) as usize;
            if frame.data[center] == 250 {
                seen = true;
                break;
            }
        }
        assert!(seen);
        assert_eq!(released.load(Ordering::SeqCst), 0);

        offload.stop();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
