//! Recording coordinator
//!
//! Owns the recording lifecycle: storage, compositor, audio mix, encoder and
//! chunk delivery, and keeps them in step with participant changes.

use super::artifact::RecordingBlob;
use super::config::RecorderConfig;
use super::error::{RecordingError, RecordingResult};
use super::pump::{run_chunk_pump, PumpReport};
use super::sink::SessionStorage;
use super::state::{RecordingEvent, RecordingSession, RecordingState};
use crate::audio::AudioMixer;
use crate::capture::{audio_tracks, compute_slots, FrameAcquisition, FrameSink, Participant, TrackSlot};
use crate::compositor::{CompositeFrame, CompositorOffload, CompositorState, Viewport};
use crate::encoder::{resolve_format, CombinedStream, ContainerFormat, FfmpegEncoder, MediaEncoder};
use crate::storage::OriginPrivateRoot;
use crate::utils::{AppResult, ErrorResponse};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Longest wait for the encoder to report that it stopped
const ENCODER_STOP_TIMEOUT: Duration = Duration::from_secs(30);
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);
const VIDEO_QUEUE: usize = 8;

/// Builds a fresh encoder for each session
pub type EncoderFactory = Box<dyn Fn() -> Box<dyn MediaEncoder> + Send + Sync>;

/// Everything owned by a running session
struct ActiveSession {
    session: RecordingSession,
    /// Last state handed to the compositor
    layout: CompositorState,
    storage: Arc<SessionStorage>,
    compositor: Arc<CompositorOffload>,
    acquisition: FrameAcquisition,
    mixer: AudioMixer,
    encoder: Box<dyn MediaEncoder>,
    pump: JoinHandle<PumpReport>,
    ticker: JoinHandle<()>,
}

/// Pipeline pieces built during start, before the encoder runs
struct Pipeline {
    layout: CompositorState,
    compositor: Arc<CompositorOffload>,
    acquisition: FrameAcquisition,
    mixer: AudioMixer,
    stream: CombinedStream,
}

pub struct RecordingCoordinator {
    config: RecorderConfig,
    root: OriginPrivateRoot,
    format: Option<ContainerFormat>,
    encoder_factory: EncoderFactory,
    viewport: Option<Viewport>,
    state: Arc<RwLock<RecordingState>>,
    event_tx: broadcast::Sender<RecordingEvent>,
    active: Option<ActiveSession>,
}

fn slot_state(slots: &[TrackSlot], viewport: Option<Viewport>) -> CompositorState {
    CompositorState {
        slots: slots.iter().map(TrackSlot::metadata).collect(),
        viewport,
    }
}

impl RecordingCoordinator {
    /// Coordinator using ffmpeg and the process-wide negotiated format
    pub fn new(config: RecorderConfig) -> RecordingResult<Self> {
        Self::with_encoder(config, None, Box::new(|| Box::new(FfmpegEncoder::new())))
    }

    /// Coordinator built from a JSON config file
    pub fn from_config_file(path: &Path) -> AppResult<Self> {
        let config = RecorderConfig::load(path)?;
        Ok(Self::new(config)?)
    }

    /// Coordinator with a custom encoder. `format` overrides negotiation.
    pub fn with_encoder(
        config: RecorderConfig,
        format: Option<ContainerFormat>,
        encoder_factory: EncoderFactory,
    ) -> RecordingResult<Self> {
        config
            .validate()
            .map_err(|e| RecordingError::Configuration(e.to_string()))?;
        let root = OriginPrivateRoot::open(&config.storage_root)?;
        let (event_tx, _) = broadcast::channel(100);
        Ok(Self {
            viewport: config.viewport,
            config,
            root,
            format,
            encoder_factory,
            state: Arc::new(RwLock::new(RecordingState::Idle)),
            event_tx,
            active: None,
        })
    }

    /// Get the current recording state
    pub fn state(&self) -> RecordingState {
        *self.state.read()
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.active.as_ref().map(|a| &a.session)
    }

    /// Running duration of the current session, 0 when idle
    pub fn duration_ms(&self) -> u64 {
        self.session().map_or(0, RecordingSession::duration_ms)
    }

    pub fn root(&self) -> &OriginPrivateRoot {
        &self.root
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    /// Change the viewport used as the grid compactness hint. Applies to the
    /// running session right away and to later sessions.
    pub fn set_viewport(&mut self, viewport: Option<Viewport>) {
        self.viewport = viewport;
        if let Some(active) = self.active.as_mut() {
            active.layout.viewport = viewport;
            active.compositor.update_state(active.layout.clone());
        }
        tracing::debug!("Viewport set to {:?}", viewport);
    }

    fn set_state(&self, state: RecordingState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            tracing::debug!("Recording state {:?} -> {:?}", previous, state);
        }
    }

    fn emit(&self, event: RecordingEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Start recording the given participants
    pub async fn start(&mut self, participants: &[Participant]) -> RecordingResult<RecordingSession> {
        if self.state() != RecordingState::Idle || self.active.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }
        self.set_state(RecordingState::Starting);

        match self.launch(participants).await {
            Ok(active) => {
                let session = active.session.clone();
                self.active = Some(active);
                self.set_state(RecordingState::Recording);
                self.emit(RecordingEvent::Started {
                    session_id: session.id.clone(),
                });
                tracing::info!("Recording started: session={}", session.id);
                Ok(session)
            }
            Err(e) => {
                tracing::error!("Failed to start recording: {}", e);
                self.set_state(RecordingState::Idle);
                self.emit(RecordingEvent::Error(ErrorResponse::from(&e)));
                Err(e)
            }
        }
    }

    async fn launch(&self, participants: &[Participant]) -> RecordingResult<ActiveSession> {
        let format = resolve_format(self.format).await?;

        let stale = self.root.clear_stale().await;
        if stale > 0 {
            tracing::info!("Cleared {} files from an abandoned session", stale);
        }

        let session = RecordingSession::new(&format);
        let storage = Arc::new(SessionStorage::open(&self.root, self.config.isolated_storage)?);
        if let Err(e) = storage.init(&session.id, &session.extension).await {
            storage.terminate();
            return Err(e.into());
        }

        let pipeline = match self.build_pipeline(participants) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                storage.discard().await;
                return Err(e);
            }
        };
        let Pipeline {
            layout,
            compositor,
            acquisition,
            mixer,
            stream,
        } = pipeline;

        let mut encoder = (self.encoder_factory)();
        let events = match encoder.start(stream, format, self.config.timeslice()).await {
            Ok(events) => events,
            Err(e) => {
                storage.discard().await;
                return Err(e);
            }
        };

        let pump = tokio::spawn(run_chunk_pump(
            events,
            storage.clone(),
            self.config.chunk_policy(),
            self.event_tx.clone(),
        ));

        let ticker_session = session.clone();
        let ticker_tx = self.event_tx.clone();
        let ticker = tokio::spawn(async move {
            let mut clock = tokio::time::interval(PROGRESS_INTERVAL);
            clock.tick().await;
            loop {
                clock.tick().await;
                let _ = ticker_tx.send(RecordingEvent::Progress(ticker_session.duration_ms()));
            }
        });

        Ok(ActiveSession {
            session,
            layout,
            storage,
            compositor,
            acquisition,
            mixer,
            encoder,
            pump,
            ticker,
        })
    }

    fn build_pipeline(&self, participants: &[Participant]) -> RecordingResult<Pipeline> {
        let (frame_tx, frame_rx) = mpsc::channel::<CompositeFrame>(VIDEO_QUEUE);
        let compositor = Arc::new(CompositorOffload::spawn(frame_tx)?);

        let slots = compute_slots(participants);
        let layout = slot_state(&slots, self.viewport);
        compositor.init(self.config.compositor(), layout.clone());
        compositor.render();

        let sink: Arc<dyn FrameSink> = compositor.clone();
        let mut acquisition = FrameAcquisition::new(sink);
        acquisition.reconcile(&slots);

        let (mut mixer, audio_rx) =
            AudioMixer::start(self.config.sample_rate, self.config.channels, self.config.mix_period());
        mixer.reconcile(&audio_tracks(participants));

        tracing::info!(
            "Pipeline ready: {} slots, {} audio inputs",
            slots.len(),
            mixer.connected().len()
        );

        Ok(Pipeline {
            layout,
            compositor,
            acquisition,
            mixer,
            stream: CombinedStream {
                video: frame_rx,
                audio: audio_rx,
                width: self.config.width,
                height: self.config.height,
                fps: self.config.fps,
                sample_rate: self.config.sample_rate,
                channels: self.config.channels,
            },
        })
    }

    /// React to participants joining, leaving or toggling tracks
    pub fn update_participants(&mut self, participants: &[Participant]) -> RecordingResult<()> {
        let Some(active) = self.active.as_mut() else {
            return Err(RecordingError::NotRecording);
        };

        let slots = compute_slots(participants);
        active.acquisition.reconcile(&slots);
        active.layout = slot_state(&slots, self.viewport);
        active.compositor.update_state(active.layout.clone());
        active.mixer.reconcile(&audio_tracks(participants));
        tracing::debug!("Participants updated: {} slots", slots.len());
        Ok(())
    }

    /// Stop recording and hand back the finished recording.
    ///
    /// Returns `None` when no session is running or nothing was recorded.
    pub async fn stop(&mut self) -> RecordingResult<Option<RecordingBlob>> {
        let Some(mut active) = self.active.take() else {
            tracing::debug!("Stop requested while idle");
            return Ok(None);
        };
        self.set_state(RecordingState::Stopping);
        tracing::info!("Stopping recording: session={}", active.session.id);

        if let Err(e) = active.encoder.stop().await {
            tracing::warn!("Encoder stop failed: {}", e);
        }

        let report = match tokio::time::timeout(ENCODER_STOP_TIMEOUT, &mut active.pump).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                tracing::error!("Chunk pump failed: {}", e);
                PumpReport::default()
            }
            Err(_) => {
                tracing::warn!("Encoder did not stop in time, dropping remaining chunks");
                active.pump.abort();
                PumpReport::default()
            }
        };

        tokio::time::sleep(self.config.stop_grace()).await;

        let result = self.collect_blob(&active, &report).await;
        self.teardown(active).await;
        self.set_state(RecordingState::Idle);

        match &result {
            Ok(_) => self.emit(RecordingEvent::Stopped),
            Err(e) => self.emit(RecordingEvent::Error(ErrorResponse::from(e))),
        }
        result
    }

    async fn collect_blob(
        &self,
        active: &ActiveSession,
        report: &PumpReport,
    ) -> RecordingResult<Option<RecordingBlob>> {
        let name = active.storage.finalize().await?;
        let data = self.root.read_file(&name).await?;
        if data.is_empty() {
            tracing::info!("Nothing was recorded in session {}", active.session.id);
            return Ok(None);
        }

        tracing::info!(
            "Recording finished: session={}, {} bytes in {} chunks ({} failed)",
            active.session.id,
            data.len(),
            report.chunks_written,
            report.chunks_failed
        );
        Ok(Some(RecordingBlob::new(
            data,
            active.session.mime_type.clone(),
            active.session.extension.clone(),
        )))
    }

    async fn teardown(&self, active: ActiveSession) {
        let ActiveSession {
            storage,
            compositor,
            mut acquisition,
            mut mixer,
            ticker,
            ..
        } = active;

        ticker.abort();
        acquisition.stop_all();
        mixer.stop();
        if let Err(e) = tokio::task::spawn_blocking(move || compositor.stop()).await {
            tracing::warn!("Compositor shutdown failed: {}", e);
        }

        if let Err(e) = storage.clear().await {
            tracing::warn!("Failed to clear session storage: {}", e);
        }
        storage.close().await;
    }

    /// Tear everything down without producing a recording
    pub fn abort(&mut self) {
        let Some(active) = self.active.take() else {
            self.set_state(RecordingState::Idle);
            return;
        };
        tracing::warn!("Aborting recording: session={}", active.session.id);

        let ActiveSession {
            storage,
            mut acquisition,
            mut mixer,
            pump,
            ticker,
            ..
        } = active;
        ticker.abort();
        pump.abort();
        acquisition.stop_all();
        mixer.stop();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { storage.discard().await });
            }
            Err(_) => storage.terminate(),
        }
        self.set_state(RecordingState::Idle);
    }
}

impl Drop for RecordingCoordinator {
    fn drop(&mut self) {
        self.abort();
    }
}
