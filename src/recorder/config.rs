//! Recorder configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.

use crate::compositor::{CompositorConfig, Viewport};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// What to do when a chunk cannot be written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkFailurePolicy {
    /// Extra attempts per chunk after the first failure
    pub max_retries: u32,
    /// Stop writing after this many consecutive failed chunks
    pub abandon_after: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub mix_period_ms: u64,
    /// Interval between encoded chunks
    pub timeslice_ms: u64,
    /// Wait after the encoder stops before finalizing storage
    pub stop_grace_ms: u64,
    pub storage_root: PathBuf,
    pub downloads_dir: PathBuf,
    /// Run the storage engine in an isolated worker context
    pub isolated_storage: bool,
    pub max_retries: u32,
    pub abandon_after: Option<u32>,
    pub sidebar_width: u32,
    pub sidebar_max_participants: usize,
    pub tile_gap: u32,
    pub corner_radius: u32,
    /// Host viewport shape; a portrait viewport stacks grid tiles vertically
    pub viewport: Option<Viewport>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        let base = std::env::temp_dir().join("meeting-recorder");
        let layout = CompositorConfig::default();
        Self {
            width: layout.width,
            height: layout.height,
            fps: layout.fps,
            sample_rate: 48000,
            channels: 2,
            mix_period_ms: 20,
            timeslice_ms: 1000,
            stop_grace_ms: 500,
            storage_root: base.join("origin-private"),
            downloads_dir: base.join("downloads"),
            isolated_storage: true,
            max_retries: 0,
            abandon_after: None,
            sidebar_width: layout.sidebar_width,
            sidebar_max_participants: layout.sidebar_max_participants,
            tile_gap: layout.gap,
            corner_radius: layout.corner_radius,
            viewport: None,
        }
    }
}

impl RecorderConfig {
    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn nonzero(field: &'static str, value: u64) -> Result<(), ConfigError> {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
            Ok(())
        }

        nonzero("width", self.width as u64)?;
        nonzero("height", self.height as u64)?;
        nonzero("fps", self.fps as u64)?;
        nonzero("sampleRate", self.sample_rate as u64)?;
        nonzero("channels", self.channels as u64)?;
        nonzero("mixPeriodMs", self.mix_period_ms)?;
        nonzero("timesliceMs", self.timeslice_ms)?;

        // Raw RGBA frames must have even dimensions for yuv420p
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(ConfigError::Invalid {
                field: "width/height",
                reason: format!("{}x{} is not even", self.width, self.height),
            });
        }
        Ok(())
    }

    pub fn compositor(&self) -> CompositorConfig {
        CompositorConfig {
            width: self.width,
            height: self.height,
            fps: self.fps,
            sidebar_width: self.sidebar_width,
            sidebar_max_participants: self.sidebar_max_participants,
            gap: self.tile_gap,
            corner_radius: self.corner_radius,
            ..CompositorConfig::default()
        }
    }

    pub fn chunk_policy(&self) -> ChunkFailurePolicy {
        ChunkFailurePolicy {
            max_retries: self.max_retries,
            abandon_after: self.abandon_after,
        }
    }

    pub fn mix_period(&self) -> Duration {
        Duration::from_millis(self.mix_period_ms)
    }

    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}
