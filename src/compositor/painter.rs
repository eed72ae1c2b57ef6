//! Paint one composite frame per tick
//!
//! Draw order per tick: background, tile content (video or placeholder),
//! speaking borders, then name labels on top of everything.

use super::canvas::{write_rgba_png, Canvas, ImageRef, Rect, Rgba, SourceRect};
use super::frame_cache::FrameCache;
use super::glyphs::text_width;
use super::layout::{fit_contain, fit_cover, initials, plan_layout, slot_color, Fit, LayoutPlan, TilePlacement};
use super::state::{CompositorConfig, CompositorState};
use crate::capture::SlotMetadata;
use std::path::Path;

const BACKGROUND: Rgba = [0x12, 0x12, 0x16, 255];
const TILE_BACKGROUND: Rgba = [0x26, 0x27, 0x2E, 255];
const SCREEN_BACKGROUND: Rgba = [0, 0, 0, 255];
const SPEAKING_BORDER: Rgba = [0x2E, 0xCC, 0x71, 255];
const LABEL_SHADOW: Rgba = [0, 0, 0, 160];
const WHITE: Rgba = [255, 255, 255, 255];

pub const PLACEHOLDER_TEXT: &str = "Waiting for participants";

/// Rendered output of one paint tick
#[derive(Debug, Clone)]
pub struct CompositeFrame {
    pub width: u32,
    pub height: u32,
    /// RGBA8, row-major
    pub data: Vec<u8>,
    pub sequence: u64,
    pub timestamp_ms: u64,
}

impl CompositeFrame {
    pub fn write_png(&self, path: &Path) -> Result<(), png::EncodingError> {
        write_rgba_png(path, self.width, self.height, &self.data)
    }
}

pub struct Compositor {
    config: CompositorConfig,
    canvas: Canvas,
    sequence: u64,
}

impl Compositor {
    pub fn new(config: CompositorConfig) -> Self {
        let canvas = Canvas::new(config.width, config.height);
        Self {
            config,
            canvas,
            sequence: 0,
        }
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Paint the current state into the canvas
    pub fn paint(&mut self, state: &CompositorState, cache: &FrameCache) -> LayoutPlan {
        self.canvas.clear(BACKGROUND);
        let plan = plan_layout(&state.slots, &self.config, state.compact());

        if plan.tiles.is_empty() {
            self.paint_placeholder_message();
            return plan;
        }

        for tile in &plan.tiles {
            let slot = &state.slots[tile.slot];
            match tile.fit {
                Fit::Contain => self.paint_screen_share(tile, slot, cache),
                Fit::Cover => self.paint_tile(tile, slot, cache),
            }
        }

        for tile in &plan.tiles {
            let slot = &state.slots[tile.slot];
            if slot.is_speaking && !slot.is_screen_share {
                self.canvas.stroke_rounded_rect(
                    tile.rect,
                    self.config.corner_radius,
                    self.config.border_width,
                    SPEAKING_BORDER,
                );
            }
        }

        for tile in &plan.tiles {
            self.paint_label(tile.rect, &state.slots[tile.slot].name);
        }

        plan
    }

    /// Paint and copy the canvas out as a frame
    pub fn render(&mut self, state: &CompositorState, cache: &FrameCache, timestamp_ms: u64) -> CompositeFrame {
        self.paint(state, cache);
        self.sequence += 1;
        CompositeFrame {
            width: self.canvas.width(),
            height: self.canvas.height(),
            data: self.canvas.data().to_vec(),
            sequence: self.sequence,
            timestamp_ms,
        }
    }

    fn paint_placeholder_message(&mut self) {
        let scale = (self.config.height / 120).max(1);
        let width = text_width(PLACEHOLDER_TEXT, scale) as i32;
        let height = Canvas::line_height(scale) as i32;
        let x = (self.config.width as i32 - width) / 2;
        let y = (self.config.height as i32 - height) / 2;
        self.canvas.draw_text(PLACEHOLDER_TEXT, x, y, scale, [0xB0, 0xB0, 0xB8, 255]);
    }

    fn paint_screen_share(&mut self, tile: &TilePlacement, slot: &SlotMetadata, cache: &FrameCache) {
        self.canvas.fill_rect(tile.rect, SCREEN_BACKGROUND);

        let frame = slot.has_video.then(|| cache.get(&slot.key)).flatten();
        let Some(frame) = frame else {
            self.paint_initials(tile.rect, slot);
            return;
        };

        let dest = fit_contain(frame.width(), frame.height(), tile.rect);
        let image = ImageRef {
            pixels: frame.pixels(),
            width: frame.width(),
            height: frame.height(),
        };
        let full = SourceRect {
            x: 0.0,
            y: 0.0,
            width: frame.width() as f64,
            height: frame.height() as f64,
        };
        self.canvas.draw_image(&image, full, dest, 0);
    }

    fn paint_tile(&mut self, tile: &TilePlacement, slot: &SlotMetadata, cache: &FrameCache) {
        let radius = self.config.corner_radius;
        let frame = slot.has_video.then(|| cache.get(&slot.key)).flatten();

        match frame {
            Some(frame) => {
                let source = fit_cover(frame.width(), frame.height(), tile.rect);
                let image = ImageRef {
                    pixels: frame.pixels(),
                    width: frame.width(),
                    height: frame.height(),
                };
                self.canvas.draw_image(&image, source, tile.rect, radius);
            }
            None => {
                self.canvas.fill_rounded_rect(tile.rect, radius, TILE_BACKGROUND);
                self.paint_initials(tile.rect, slot);
            }
        }
    }

    fn paint_initials(&mut self, rect: Rect, slot: &SlotMetadata) {
        let diameter = rect.width.min(rect.height) / 3;
        if diameter < 4 {
            return;
        }
        let cx = rect.x + rect.width as i32 / 2;
        let cy = rect.y + rect.height as i32 / 2;
        self.canvas.fill_circle(cx, cy, diameter / 2, slot_color(slot.index));

        let text = initials(&slot.name);
        let scale = (diameter / 20).max(1);
        let w = text_width(&text, scale) as i32;
        let h = Canvas::line_height(scale) as i32;
        self.canvas.draw_text(&text, cx - w / 2, cy - h / 2, scale, WHITE);
    }

    fn paint_label(&mut self, rect: Rect, name: &str) {
        let scale = self.config.label_scale.max(1);
        let margin = (self.config.border_width + 8) as i32;
        let text_h = Canvas::line_height(scale) as i32;

        let x = rect.x + margin;
        let y = rect.bottom() - margin - text_h;
        if y < rect.y {
            return;
        }

        let shadow = scale as i32;
        self.canvas.draw_text(name, x + shadow, y + shadow, scale, LABEL_SHADOW);
        self.canvas.draw_text(name, x, y, scale, WHITE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::VideoFrame;
    use crate::compositor::canvas::rgb;
    use crate::compositor::layout::{LayoutKind, Region};

    fn small_config() -> CompositorConfig {
        CompositorConfig {
            width: 320,
            height: 180,
            sidebar_width: 80,
            sidebar_max_participants: 3,
            gap: 4,
            corner_radius: 6,
            border_width: 2,
            label_scale: 1,
            ..CompositorConfig::default()
        }
    }

    fn slot(key: &str, index: usize) -> SlotMetadata {
        SlotMetadata {
            key: key.to_string(),
            name: key.to_string(),
            is_screen_share: false,
            is_speaking: false,
            has_video: true,
            index,
        }
    }

    fn center(rect: Rect) -> (u32, u32) {
        (
            (rect.x + rect.width as i32 / 2) as u32,
            (rect.y + rect.height as i32 / 2) as u32,
        )
    }

    #[test]
    fn test_zero_slots_paints_placeholder() {
        let mut compositor = Compositor::new(small_config());
        let plan = compositor.paint(&CompositorState::default(), &FrameCache::new());
        assert_eq!(plan.kind, LayoutKind::Empty);

        // Placeholder text leaves some non-background pixels
        let canvas = compositor.canvas();
        let painted = (0..canvas.height())
            .flat_map(|y| (0..canvas.width()).map(move |x| (x, y)))
            .filter(|&(x, y)| canvas.pixel(x, y) != Some(BACKGROUND))
            .count();
        assert!(painted > 0);
    }

    #[test]
    fn test_video_tile_draws_frame() {
        let mut compositor = Compositor::new(small_config());
        let mut cache = FrameCache::new();
        cache.upsert("alice", VideoFrame::solid(64, 48, [200, 10, 10, 255], 0));

        let state = CompositorState::new(vec![slot("alice", 0)]);
        let plan = compositor.paint(&state, &cache);

        let (cx, cy) = center(plan.tiles[0].rect);
        assert_eq!(compositor.canvas().pixel(cx, cy), Some(rgb(200, 10, 10)));
    }

    #[test]
    fn test_missing_video_draws_palette_placeholder() {
        let mut compositor = Compositor::new(small_config());
        let mut no_video = slot("bob", 9);
        no_video.has_video = false;

        let plan = compositor.paint(&CompositorState::new(vec![no_video]), &FrameCache::new());
        let rect = plan.tiles[0].rect;
        // Sample inside the circle but away from the initials
        let (cx, cy) = center(rect);
        let probe_y = cy - rect.height.min(rect.width) / 8;
        let px = compositor.canvas().pixel(cx - 10, probe_y);
        assert_eq!(px, Some(slot_color(9)));
        assert_eq!(slot_color(9), slot_color(1));
    }

    #[test]
    fn test_border_only_when_speaking() {
        let config = small_config();
        let mut compositor = Compositor::new(config.clone());
        let mut cache = FrameCache::new();
        cache.upsert("alice", VideoFrame::solid(32, 32, [0, 0, 200, 255], 0));

        let quiet = CompositorState::new(vec![slot("alice", 0)]);
        let plan = compositor.paint(&quiet, &cache);
        let rect = plan.tiles[0].rect;
        let (cx, _) = center(rect);
        let edge = (cx, rect.y as u32);
        assert_eq!(compositor.canvas().pixel(edge.0, edge.1), Some(rgb(0, 0, 200)));

        let mut speaking = slot("alice", 0);
        speaking.is_speaking = true;
        compositor.paint(&CompositorState::new(vec![speaking]), &cache);
        assert_eq!(compositor.canvas().pixel(edge.0, edge.1), Some(SPEAKING_BORDER));
    }

    #[test]
    fn test_screen_share_letterboxed() {
        let mut compositor = Compositor::new(small_config());
        let mut cache = FrameCache::new();
        // Tall source in a wide canvas: bars left and right
        cache.upsert("alice-screenshare", VideoFrame::solid(10, 40, [0, 200, 0, 255], 0));

        let mut share = slot("alice-screenshare", 0);
        share.is_screen_share = true;
        let plan = compositor.paint(&CompositorState::new(vec![share]), &cache);
        assert_eq!(plan.kind, LayoutKind::ScreenShare);

        let canvas = compositor.canvas();
        assert_eq!(canvas.pixel(2, 90), Some(SCREEN_BACKGROUND));
        assert_eq!(canvas.pixel(160, 90), Some(rgb(0, 200, 0)));
    }

    #[test]
    fn test_sidebar_stays_within_region() {
        let config = small_config();
        let mut compositor = Compositor::new(config.clone());
        let mut share = slot("host-screenshare", 0);
        share.is_screen_share = true;
        let mut slots = vec![share];
        slots.extend((0..7).map(|i| slot(&format!("p{i}"), i)));

        let plan = compositor.paint(&CompositorState::new(slots), &FrameCache::new());
        let sidebar: Vec<_> = plan.tiles_in(Region::Sidebar).collect();
        assert_eq!(sidebar.len(), config.sidebar_max_participants);
        assert_eq!(plan.omitted, 7 - config.sidebar_max_participants);
        for tile in sidebar {
            assert!(compositor.canvas().bounds().contains(&tile.rect));
        }
    }

    #[test]
    fn test_render_increments_sequence() {
        let mut compositor = Compositor::new(small_config());
        let cache = FrameCache::new();
        let state = CompositorState::default();
        let a = compositor.render(&state, &cache, 0);
        let b = compositor.render(&state, &cache, 33);
        assert_eq!(b.sequence, a.sequence + 1);
        assert_eq!(a.data.len(), (320 * 180 * 4) as usize);
    }

    #[test]
    fn test_composite_frame_png() {
        let dir = tempfile::tempdir().unwrap();
        let mut compositor = Compositor::new(small_config());
        let frame = compositor.render(&CompositorState::default(), &FrameCache::new(), 0);
        let path = dir.path().join("poster.png");
        frame.write_png(&path).unwrap();
        assert!(path.exists());
    }
}
