//! Recording system module
//!
//! - [`RecordingCoordinator`]: the session state machine
//! - chunk pump moving encoder output into storage in order
//! - configuration, session state, events and the finished artifact

pub mod artifact;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod pump;
pub mod sink;
pub mod state;

pub use artifact::RecordingBlob;
pub use config::{ChunkFailurePolicy, ConfigError, RecorderConfig};
pub use coordinator::{EncoderFactory, RecordingCoordinator};
pub use error::{RecordingError, RecordingResult};
pub use pump::{run_chunk_pump, PumpReport};
pub use sink::SessionStorage;
pub use state::{RecordingEvent, RecordingSession, RecordingState};
