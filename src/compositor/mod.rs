//! Compositor
//!
//! Paints the latest frame of every slot into one fixed-size canvas per
//! tick, using a screen-share + sidebar layout or a grid.

pub mod canvas;
pub mod frame_cache;
pub mod glyphs;
pub mod layout;
pub mod offload;
pub mod painter;
pub mod state;

pub use canvas::{Canvas, Rect, Rgba};
pub use frame_cache::FrameCache;
pub use layout::{
    fit_contain, fit_cover, grid_dimensions, initials, plan_layout, slot_color, Fit, LayoutKind,
    LayoutPlan, Region, TilePlacement, PALETTE,
};
pub use offload::{CompositorMessage, CompositorOffload};
pub use painter::{CompositeFrame, Compositor};
pub use state::{CompositorConfig, CompositorState, Viewport};
