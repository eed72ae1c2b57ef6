//! RGBA paint surface
//!
//! Software drawing primitives used by the compositor: fills, rounded
//! rectangles, circles, scaled image blits and bitmap text. All operations
//! clip to the canvas bounds.

use super::glyphs::{glyph, GLYPH_ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// RGBA colour
pub type Rgba = [u8; 4];

pub fn rgb(r: u8, g: u8, b: u8) -> Rgba {
    [r, g, b, 255]
}

/// Integer rectangle in canvas pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    /// Whether `other` lies completely inside `self`
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// Fractional rectangle in source-image pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Source pixels to blit
pub struct ImageRef<'a> {
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
}

/// Check if a point is inside a rounded rectangle of the given size
pub fn is_inside_rounded_rect(x: i32, y: i32, width: i32, height: i32, radius: i32) -> bool {
    if x < 0 || y < 0 || x >= width || y >= height {
        return false;
    }
    let radius = radius.min(width / 2).min(height / 2);
    if radius <= 0 {
        return true;
    }

    let cx = if x < radius {
        radius
    } else if x >= width - radius {
        width - radius - 1
    } else {
        return true;
    };
    let cy = if y < radius {
        radius
    } else if y >= height - radius {
        height - radius - 1
    } else {
        return true;
    };

    let dx = x - cx;
    let dy = y - cy;
    dx * dx + dy * dy <= radius * radius
}

/// Paint surface
#[derive(Debug, Clone)]
pub struct Canvas {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width * height * 4) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 4) as usize;
        Some([
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ])
    }

    pub fn clear(&mut self, color: Rgba) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(((y as u32 * self.width + x as u32) * 4) as usize)
    }

    /// Alpha-blend `color` over the pixel at (x, y)
    fn blend(&mut self, x: i32, y: i32, color: Rgba) {
        let Some(idx) = self.index(x, y) else {
            return;
        };
        let alpha = color[3] as f32 / 255.0;
        if alpha >= 0.999 {
            self.data[idx..idx + 4].copy_from_slice(&color);
            return;
        }
        if alpha < 0.01 {
            return;
        }
        for c in 0..3 {
            let src = color[c] as f32;
            let dst = self.data[idx + c] as f32;
            self.data[idx + c] = (src * alpha + dst * (1.0 - alpha)).clamp(0.0, 255.0) as u8;
        }
        self.data[idx + 3] = 255;
    }

    /// Visible part of `rect`, as (x0, y0, x1, y1)
    fn clip(&self, rect: Rect) -> Option<(i32, i32, i32, i32)> {
        let x0 = rect.x.max(0);
        let y0 = rect.y.max(0);
        let x1 = rect.right().min(self.width as i32);
        let y1 = rect.bottom().min(self.height as i32);
        (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Rgba) {
        self.fill_rounded_rect(rect, 0, color);
    }

    pub fn fill_rounded_rect(&mut self, rect: Rect, radius: u32, color: Rgba) {
        let Some((x0, y0, x1, y1)) = self.clip(rect) else {
            return;
        };
        let (w, h, r) = (rect.width as i32, rect.height as i32, radius as i32);
        for y in y0..y1 {
            for x in x0..x1 {
                if is_inside_rounded_rect(x - rect.x, y - rect.y, w, h, r) {
                    self.blend(x, y, color);
                }
            }
        }
    }

    /// Outline a rounded rectangle with a band `thickness` pixels wide,
    /// drawn on the inside of `rect`
    pub fn stroke_rounded_rect(&mut self, rect: Rect, radius: u32, thickness: u32, color: Rgba) {
        let Some((x0, y0, x1, y1)) = self.clip(rect) else {
            return;
        };
        let (w, h, r, t) = (
            rect.width as i32,
            rect.height as i32,
            radius as i32,
            thickness as i32,
        );
        let inner_r = (r - t).max(0);
        for y in y0..y1 {
            for x in x0..x1 {
                let (lx, ly) = (x - rect.x, y - rect.y);
                if !is_inside_rounded_rect(lx, ly, w, h, r) {
                    continue;
                }
                let inside_inner =
                    is_inside_rounded_rect(lx - t, ly - t, w - 2 * t, h - 2 * t, inner_r);
                if !inside_inner {
                    self.blend(x, y, color);
                }
            }
        }
    }

    pub fn fill_circle(&mut self, cx: i32, cy: i32, radius: u32, color: Rgba) {
        let r = radius as i32;
        for y in (cy - r)..=(cy + r) {
            for x in (cx - r)..=(cx + r) {
                let (dx, dy) = (x - cx, y - cy);
                if dx * dx + dy * dy <= r * r {
                    self.blend(x, y, color);
                }
            }
        }
    }

    /// Scale the `source` region of `image` onto `dest` (nearest neighbour),
    /// optionally clipped to a rounded rectangle of radius `clip_radius`
    pub fn draw_image(&mut self, image: &ImageRef<'_>, source: SourceRect, dest: Rect, clip_radius: u32) {
        if image.width == 0 || image.height == 0 || dest.width == 0 || dest.height == 0 {
            return;
        }
        let Some((x0, y0, x1, y1)) = self.clip(dest) else {
            return;
        };
        let (w, h, r) = (dest.width as i32, dest.height as i32, clip_radius as i32);
        let scale_x = source.width / dest.width as f64;
        let scale_y = source.height / dest.height as f64;

        for y in y0..y1 {
            let ly = y - dest.y;
            let src_y = (source.y + (ly as f64 + 0.5) * scale_y) as u32;
            let src_y = src_y.min(image.height - 1);
            for x in x0..x1 {
                let lx = x - dest.x;
                if r > 0 && !is_inside_rounded_rect(lx, ly, w, h, r) {
                    continue;
                }
                let src_x = (source.x + (lx as f64 + 0.5) * scale_x) as u32;
                let src_x = src_x.min(image.width - 1);

                let src_idx = ((src_y * image.width + src_x) * 4) as usize;
                let Some(dst_idx) = self.index(x, y) else {
                    continue;
                };
                if src_idx + 3 >= image.pixels.len() {
                    continue;
                }
                self.data[dst_idx..dst_idx + 3].copy_from_slice(&image.pixels[src_idx..src_idx + 3]);
                self.data[dst_idx + 3] = 255;
            }
        }
    }

    /// Draw `text` with its top-left corner at (x, y)
    pub fn draw_text(&mut self, text: &str, x: i32, y: i32, scale: u32, color: Rgba) {
        let scale = scale.max(1) as i32;
        let mut pen_x = x;
        for c in text.chars() {
            let rows = glyph(c);
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH as i32 {
                    if bits & (0x10 >> col) == 0 {
                        continue;
                    }
                    let px = pen_x + col * scale;
                    let py = y + row as i32 * scale;
                    for sy in 0..scale {
                        for sx in 0..scale {
                            self.blend(px + sx, py + sy, color);
                        }
                    }
                }
            }
            pen_x += GLYPH_ADVANCE as i32 * scale;
        }
    }

    /// Height of a text line at `scale`
    pub fn line_height(scale: u32) -> u32 {
        GLYPH_HEIGHT * scale.max(1)
    }

    /// Encode the current contents as a PNG file
    pub fn write_png(&self, path: &Path) -> Result<(), png::EncodingError> {
        write_rgba_png(path, self.width, self.height, &self.data)
    }
}

pub(crate) fn write_rgba_png(
    path: &Path,
    width: u32,
    height: u32,
    data: &[u8],
) -> Result<(), png::EncodingError> {
    let file = std::fs::File::create(path)?;
    let mut encoder = png::Encoder::new(std::io::BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounded_rect_corners_excluded() {
        assert!(!is_inside_rounded_rect(0, 0, 100, 100, 10));
        assert!(is_inside_rounded_rect(50, 0, 100, 100, 10));
        assert!(is_inside_rounded_rect(10, 10, 100, 100, 10));
        assert!(!is_inside_rounded_rect(99, 99, 100, 100, 10));
        assert!(is_inside_rounded_rect(0, 0, 100, 100, 0));
    }

    #[test]
    fn test_fill_rect_clips_to_canvas() {
        let mut canvas = Canvas::new(4, 4);
        canvas.fill_rect(Rect::new(-2, -2, 4, 4), rgb(255, 0, 0));
        assert_eq!(canvas.pixel(0, 0), Some(rgb(255, 0, 0)));
        assert_eq!(canvas.pixel(1, 1), Some(rgb(255, 0, 0)));
        assert_eq!(canvas.pixel(2, 2), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_stroke_leaves_interior_untouched() {
        let mut canvas = Canvas::new(20, 20);
        canvas.clear(rgb(0, 0, 0));
        canvas.stroke_rounded_rect(Rect::new(0, 0, 20, 20), 0, 2, rgb(0, 255, 0));
        assert_eq!(canvas.pixel(0, 10), Some(rgb(0, 255, 0)));
        assert_eq!(canvas.pixel(1, 10), Some(rgb(0, 255, 0)));
        assert_eq!(canvas.pixel(2, 10), Some(rgb(0, 0, 0)));
        assert_eq!(canvas.pixel(10, 10), Some(rgb(0, 0, 0)));
    }

    #[test]
    fn test_draw_image_scales_nearest() {
        // 2x1 image: red | blue
        let pixels = [255, 0, 0, 255, 0, 0, 255, 255];
        let image = ImageRef { pixels: &pixels, width: 2, height: 1 };
        let mut canvas = Canvas::new(4, 2);
        let source = SourceRect { x: 0.0, y: 0.0, width: 2.0, height: 1.0 };
        canvas.draw_image(&image, source, Rect::new(0, 0, 4, 2), 0);
        assert_eq!(canvas.pixel(0, 0), Some(rgb(255, 0, 0)));
        assert_eq!(canvas.pixel(1, 1), Some(rgb(255, 0, 0)));
        assert_eq!(canvas.pixel(2, 0), Some(rgb(0, 0, 255)));
        assert_eq!(canvas.pixel(3, 1), Some(rgb(0, 0, 255)));
    }

    #[test]
    fn test_blend_half_alpha() {
        let mut canvas = Canvas::new(1, 1);
        canvas.clear(rgb(0, 0, 0));
        canvas.fill_rect(Rect::new(0, 0, 1, 1), [200, 100, 50, 128]);
        let px = canvas.pixel(0, 0).unwrap();
        assert!((99..=101).contains(&px[0]));
        assert_eq!(px[3], 255);
    }

    #[test]
    fn test_write_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let mut canvas = Canvas::new(8, 8);
        canvas.clear(rgb(10, 20, 30));
        canvas.write_png(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }
}
