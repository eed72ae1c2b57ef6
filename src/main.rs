//! Records a short synthetic two-participant meeting and saves the download.
//!
//! Usage: `meeting-recorder [config.json] [seconds]`

use anyhow::Context;
use meeting_recorder_lib::capture::{Participant, TestPatternSource, ToneSource, VideoTrack, AudioTrack};
use meeting_recorder_lib::{init_logging, RecorderConfig, RecordingCoordinator, RecordingEvent};
use std::path::Path;
use std::time::Duration;

fn participants(config: &RecorderConfig, bob_sharing: bool) -> Vec<Participant> {
    let (w, h, fps) = (640, 360, config.fps);
    let (rate, ch) = (config.sample_rate, config.channels);

    let mut alice = Participant::new("alice");
    alice.name = Some("Alice Moreau".to_string());
    alice.is_speaking = !bob_sharing;
    alice.camera = Some(VideoTrack::new("alice-cam", TestPatternSource::new(w, h, fps, [200, 80, 60, 255])));
    alice.microphone = Some(AudioTrack::new("alice-mic", ToneSource::new(440.0, 0.2, rate, ch)));

    // Bob has no camera, so his tile shows the placeholder
    let mut bob = Participant::new("bob");
    bob.name = Some("Bob".to_string());
    bob.is_speaking = bob_sharing;
    bob.microphone = Some(AudioTrack::new("bob-mic", ToneSource::new(660.0, 0.2, rate, ch)));
    if bob_sharing {
        bob.screen_share = Some(VideoTrack::new(
            "bob-screen",
            TestPatternSource::new(1280, 720, fps, [40, 90, 160, 255]),
        ));
    }

    vec![alice, bob]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let mut coordinator = match args.get(1) {
        Some(path) => RecordingCoordinator::from_config_file(Path::new(path))
            .with_context(|| format!("loading {}", path))?,
        None => RecordingCoordinator::new(RecorderConfig::default())?,
    };
    let seconds: u64 = match args.get(2) {
        Some(s) => s.parse().context("seconds must be a number")?,
        None => 6,
    };

    tracing::info!("Starting Meeting Recorder v{}", env!("CARGO_PKG_VERSION"));

    let config = coordinator.config().clone();
    let downloads = config.downloads_dir.clone();
    let mut events = coordinator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RecordingEvent::Progress(ms) => tracing::info!("Recording... {:.1}s", ms as f64 / 1000.0),
                RecordingEvent::Error(e) => tracing::error!("{}: {}", e.code, e.message),
                other => tracing::debug!("Event: {:?}", other),
            }
        }
    });

    coordinator.start(&participants(&config, false)).await?;

    let half = Duration::from_secs(seconds) / 2;
    tokio::time::sleep(half).await;
    coordinator.update_participants(&participants(&config, true))?;
    tokio::time::sleep(half).await;

    match coordinator.stop().await? {
        Some(blob) => {
            let path = blob.save_to(&downloads).await.context("saving recording")?;
            println!("{}", path.display());
        }
        None => tracing::warn!("Nothing was recorded"),
    }
    Ok(())
}
