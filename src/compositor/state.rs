//! Compositor render state
//!
//! Participant metadata and layout settings; replaced wholesale on every
//! membership change.

use crate::capture::SlotMetadata;
use serde::{Deserialize, Serialize};

/// Fixed output geometry and layout constants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompositorConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub sidebar_width: u32,
    pub sidebar_max_participants: usize,
    pub gap: u32,
    pub corner_radius: u32,
    pub border_width: u32,
    pub label_scale: u32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            sidebar_width: 320,
            sidebar_max_participants: 4,
            gap: 8,
            corner_radius: 12,
            border_width: 4,
            label_scale: 3,
        }
    }
}

/// Shape of the host viewport, used as the grid compactness hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Narrow viewports stack tiles vertically first
    pub fn is_compact(&self) -> bool {
        self.width < self.height
    }
}

/// Everything the paint loop needs besides decoded frames
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositorState {
    pub slots: Vec<SlotMetadata>,
    pub viewport: Option<Viewport>,
}

impl CompositorState {
    pub fn new(slots: Vec<SlotMetadata>) -> Self {
        Self {
            slots,
            viewport: None,
        }
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn compact(&self) -> bool {
        self.viewport.is_some_and(|v| v.is_compact())
    }
}
