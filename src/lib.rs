//! Meeting Recorder - client-side recording of video meetings.
//!
//! Composites live participant tracks into one stream, encodes it
//! incrementally and streams the encoded chunks into sandboxed local storage.

pub mod audio;
pub mod capture;
pub mod compositor;
pub mod encoder;
pub mod recorder;
pub mod storage;
pub mod utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use recorder::{RecorderConfig, RecordingBlob, RecordingCoordinator, RecordingEvent, RecordingState};

/// Initialize tracing/logging; `RUST_LOG` overrides the default filter
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meeting_recorder_lib=debug,meeting_recorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
