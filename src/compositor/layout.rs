//! Layout planning
//!
//! Decides where every slot goes for one paint tick: a screen share with a
//! sidebar of participants, a lone full-frame screen share, or a grid.

use super::canvas::{rgb, Rect, Rgba, SourceRect};
use super::state::CompositorConfig;
use crate::capture::SlotMetadata;
use serde::{Deserialize, Serialize};

/// Placeholder palette; slot colours are `PALETTE[index % PALETTE.len()]`
pub const PALETTE: [[u8; 3]; 8] = [
    [0x3F, 0x37, 0xC9],
    [0xE7, 0x6F, 0x51],
    [0x2A, 0x9D, 0x8F],
    [0xE9, 0xC4, 0x6A],
    [0x8E, 0x44, 0xAD],
    [0x26, 0x86, 0xDE],
    [0xD6, 0x33, 0x84],
    [0x5C, 0x94, 0x3A],
];

pub fn slot_color(index: usize) -> Rgba {
    let [r, g, b] = PALETTE[index % PALETTE.len()];
    rgb(r, g, b)
}

/// Up to two initials from a display name
pub fn initials(name: &str) -> String {
    let words: Vec<&str> = name.split_whitespace().collect();
    let first_char = |w: &str| w.chars().find(|c| c.is_alphanumeric());

    let mut out = String::new();
    if let Some(c) = words.first().and_then(|w| first_char(w)) {
        out.extend(c.to_uppercase());
    }
    if words.len() > 1 {
        if let Some(c) = words.last().and_then(|w| first_char(w)) {
            out.extend(c.to_uppercase());
        }
    }
    if out.is_empty() {
        out.push('?');
    }
    out
}

/// Columns and rows for `count` tiles
pub fn grid_dimensions(count: usize, compact: bool) -> (usize, usize) {
    if count == 0 {
        return (0, 0);
    }
    let major = (count as f64).sqrt().ceil() as usize;
    let minor = count.div_ceil(major);
    if compact {
        (minor, major)
    } else {
        (major, minor)
    }
}

/// Scale to fill `dest`, cropping the centre of the source
pub fn fit_cover(src_width: u32, src_height: u32, dest: Rect) -> SourceRect {
    let (sw, sh) = (src_width as f64, src_height as f64);
    let scale = (dest.width as f64 / sw).max(dest.height as f64 / sh);
    let width = (dest.width as f64 / scale).min(sw);
    let height = (dest.height as f64 / scale).min(sh);
    SourceRect {
        x: (sw - width) / 2.0,
        y: (sh - height) / 2.0,
        width,
        height,
    }
}

/// Largest rectangle inside `dest` with the source aspect ratio, centred
pub fn fit_contain(src_width: u32, src_height: u32, dest: Rect) -> Rect {
    let scale = (dest.width as f64 / src_width as f64).min(dest.height as f64 / src_height as f64);
    let width = ((src_width as f64 * scale).round() as u32).min(dest.width);
    let height = ((src_height as f64 * scale).round() as u32).min(dest.height);
    Rect::new(
        dest.x + ((dest.width - width) / 2) as i32,
        dest.y + ((dest.height - height) / 2) as i32,
        width,
        height,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Fit {
    Cover,
    Contain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Region {
    Main,
    Sidebar,
    Grid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum LayoutKind {
    Empty,
    ScreenShare,
    ScreenShareWithSidebar,
    Grid { columns: usize, rows: usize },
}

/// Placement of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TilePlacement {
    /// Index into the state's slot list
    pub slot: usize,
    pub rect: Rect,
    pub fit: Fit,
    pub region: Region,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutPlan {
    pub kind: LayoutKind,
    pub tiles: Vec<TilePlacement>,
    /// Slots left out (sidebar overflow, extra screen shares)
    pub omitted: usize,
}

impl LayoutPlan {
    pub fn tiles_in(&self, region: Region) -> impl Iterator<Item = &TilePlacement> {
        self.tiles.iter().filter(move |t| t.region == region)
    }
}

/// Plan the layout for `slots` on the configured canvas
pub fn plan_layout(slots: &[SlotMetadata], config: &CompositorConfig, compact: bool) -> LayoutPlan {
    if slots.is_empty() {
        return LayoutPlan {
            kind: LayoutKind::Empty,
            tiles: Vec::new(),
            omitted: 0,
        };
    }

    let screen_shares: Vec<usize> = (0..slots.len()).filter(|&i| slots[i].is_screen_share).collect();
    let regulars: Vec<usize> = (0..slots.len()).filter(|&i| !slots[i].is_screen_share).collect();
    let extra_shares = screen_shares.len().saturating_sub(1);

    let (w, h, gap) = (config.width, config.height, config.gap);

    match (screen_shares.first(), regulars.is_empty()) {
        (Some(&share), false) => {
            let sidebar_width = config.sidebar_width.min(w.saturating_sub(3 * gap) / 2);
            let main = Rect::new(
                gap as i32,
                gap as i32,
                w.saturating_sub(sidebar_width + 3 * gap),
                h.saturating_sub(2 * gap),
            );
            let mut tiles = vec![TilePlacement {
                slot: share,
                rect: main,
                fit: Fit::Contain,
                region: Region::Main,
            }];

            let shown = regulars.len().min(config.sidebar_max_participants);
            if shown > 0 {
                let n = shown as u32;
                let tile_height = h.saturating_sub((n + 1) * gap) / n;
                let x = main.right() + gap as i32;
                for (i, &slot) in regulars.iter().take(shown).enumerate() {
                    let y = gap + i as u32 * (tile_height + gap);
                    tiles.push(TilePlacement {
                        slot,
                        rect: Rect::new(x, y as i32, sidebar_width, tile_height),
                        fit: Fit::Cover,
                        region: Region::Sidebar,
                    });
                }
            }

            LayoutPlan {
                kind: LayoutKind::ScreenShareWithSidebar,
                tiles,
                omitted: regulars.len() - shown + extra_shares,
            }
        }
        (Some(&share), true) => LayoutPlan {
            kind: LayoutKind::ScreenShare,
            tiles: vec![TilePlacement {
                slot: share,
                rect: Rect::new(0, 0, w, h),
                fit: Fit::Contain,
                region: Region::Main,
            }],
            omitted: extra_shares,
        },
        (None, _) => {
            let (columns, rows) = grid_dimensions(regulars.len(), compact);
            let cols = columns as u32;
            let rws = rows as u32;
            let cell_width = w.saturating_sub((cols + 1) * gap) / cols;
            let cell_height = h.saturating_sub((rws + 1) * gap) / rws;

            let tiles = regulars
                .iter()
                .enumerate()
                .map(|(i, &slot)| {
                    let (col, row) = ((i % columns) as u32, (i / columns) as u32);
                    TilePlacement {
                        slot,
                        rect: Rect::new(
                            (gap + col * (cell_width + gap)) as i32,
                            (gap + row * (cell_height + gap)) as i32,
                            cell_width,
                            cell_height,
                        ),
                        fit: Fit::Cover,
                        region: Region::Grid,
                    }
                })
                .collect();

            LayoutPlan {
                kind: LayoutKind::Grid { columns, rows },
                tiles,
                omitted: 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(key: &str, index: usize, is_screen_share: bool) -> SlotMetadata {
        SlotMetadata {
            key: key.to_string(),
            name: key.to_string(),
            is_screen_share,
            is_speaking: false,
            has_video: true,
            index,
        }
    }

    fn regulars(n: usize) -> Vec<SlotMetadata> {
        (0..n).map(|i| slot(&format!("p{i}"), i, false)).collect()
    }

    #[test]
    fn test_grid_dimensions() {
        assert_eq!(grid_dimensions(0, false), (0, 0));
        assert_eq!(grid_dimensions(1, false), (1, 1));
        assert_eq!(grid_dimensions(2, false), (2, 1));
        assert_eq!(grid_dimensions(2, true), (1, 2));
        assert_eq!(grid_dimensions(5, false), (3, 2));
        assert_eq!(grid_dimensions(9, false), (3, 3));
        assert_eq!(grid_dimensions(10, true), (3, 4));
    }

    #[test]
    fn test_empty_plan() {
        let plan = plan_layout(&[], &CompositorConfig::default(), false);
        assert_eq!(plan.kind, LayoutKind::Empty);
        assert!(plan.tiles.is_empty());
    }

    #[test]
    fn test_sidebar_truncates_overflow() {
        let config = CompositorConfig::default();
        let mut slots = vec![slot("share", 0, true)];
        slots.extend(regulars(7));

        let plan = plan_layout(&slots, &config, false);
        assert_eq!(plan.kind, LayoutKind::ScreenShareWithSidebar);

        let sidebar: Vec<_> = plan.tiles_in(Region::Sidebar).collect();
        assert_eq!(sidebar.len(), 7.min(config.sidebar_max_participants));
        assert_eq!(plan.omitted, 7 - sidebar.len());

        // First N by slot order
        let keys: Vec<_> = sidebar.iter().map(|t| slots[t.slot].key.as_str()).collect();
        assert_eq!(keys, ["p0", "p1", "p2", "p3"]);

        let canvas = Rect::new(0, 0, config.width, config.height);
        let main = plan.tiles_in(Region::Main).next().unwrap();
        for tile in &sidebar {
            assert!(canvas.contains(&tile.rect));
            assert!(!tile.rect.intersects(&main.rect));
        }
        for pair in sidebar.windows(2) {
            assert!(!pair[0].rect.intersects(&pair[1].rect));
        }
    }

    #[test]
    fn test_lone_screen_share_is_full_frame_contain() {
        let config = CompositorConfig::default();
        let plan = plan_layout(&[slot("share", 0, true)], &config, false);
        assert_eq!(plan.kind, LayoutKind::ScreenShare);
        assert_eq!(plan.tiles[0].fit, Fit::Contain);
        assert_eq!(plan.tiles[0].rect, Rect::new(0, 0, config.width, config.height));
    }

    #[test]
    fn test_grid_is_row_major_cover() {
        let config = CompositorConfig::default();
        let plan = plan_layout(&regulars(3), &config, false);
        assert_eq!(plan.kind, LayoutKind::Grid { columns: 2, rows: 2 });
        assert!(plan.tiles.iter().all(|t| t.fit == Fit::Cover));
        assert!(plan.tiles[0].rect.x < plan.tiles[1].rect.x);
        assert_eq!(plan.tiles[0].rect.y, plan.tiles[1].rect.y);
        assert!(plan.tiles[2].rect.y > plan.tiles[0].rect.y);
    }

    #[test]
    fn test_fit_cover_crops_center() {
        // 200x100 source into a square: crop 100x100 from the middle
        let crop = fit_cover(200, 100, Rect::new(0, 0, 50, 50));
        assert_eq!(crop.width, 100.0);
        assert_eq!(crop.height, 100.0);
        assert_eq!(crop.x, 50.0);
        assert_eq!(crop.y, 0.0);
    }

    #[test]
    fn test_fit_contain_letterboxes() {
        let rect = fit_contain(1920, 1080, Rect::new(10, 0, 960, 1000));
        assert_eq!(rect.width, 960);
        assert_eq!(rect.height, 540);
        assert_eq!(rect.x, 10);
        assert_eq!(rect.y, 230);
    }

    #[test]
    fn test_slot_color_wraps_palette() {
        for i in 0..20 {
            assert_eq!(slot_color(i), slot_color(i + PALETTE.len()));
        }
        assert_ne!(slot_color(0), slot_color(1));
    }

    #[test]
    fn test_initials() {
        assert_eq!(initials("Alice"), "A");
        assert_eq!(initials("alice van der berg"), "AB");
        assert_eq!(initials("  "), "?");
        assert_eq!(initials("(bob) smith"), "BS");
    }
}
