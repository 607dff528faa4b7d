//! Glyph rasterization into signed distance fields.

use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Transform};
use ttf_parser::{Face, OutlineBuilder};

use super::pbf::{Glyph, GlyphRange};
use crate::error::{PantilerError, Result};

/// Large finite stand-in for infinity in the distance transform.
const INF: f64 = 1e20;

/// Raw font data plus the name it is published under.
#[derive(Debug, Clone)]
pub struct FontData {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Renders the glyphs of one range of a font.
pub trait GlyphRasterizer: Send + Sync {
    /// Render every code point of `range` the font has a glyph for.
    fn rasterize(&self, font: &FontData, range: GlyphRange) -> Result<Vec<Glyph>>;
}

/// Renders outlines with `tiny-skia` and converts coverage to a distance field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SdfRasterizer {
    /// Em size in pixels.
    pub size: f32,
    /// Padding around each bitmap, in pixels.
    pub buffer: u32,
    /// Distance, in pixels, covered by the field's value range.
    pub radius: f64,
    /// Fraction of the value range used for the inside of a glyph.
    pub cutoff: f64,
}

impl Default for SdfRasterizer {
    fn default() -> Self {
        Self {
            size: 24.0,
            buffer: 3,
            radius: 8.0,
            cutoff: 0.25,
        }
    }
}

/// Collects an outline as a `tiny-skia` path in font units.
struct PathSink(PathBuilder);

impl OutlineBuilder for PathSink {
    fn move_to(&mut self, x: f32, y: f32) {
        self.0.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.0.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.0.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.0.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.0.close();
    }
}

impl SdfRasterizer {
    fn glyph(&self, face: &Face<'_>, code_point: u32) -> Option<Glyph> {
        let c = char::from_u32(code_point)?;
        let id = face.glyph_index(c)?;
        let scale = self.size / f32::from(face.units_per_em().max(1));
        let advance = face
            .glyph_hor_advance(id)
            .map(|a| (f32::from(a) * scale).round() as u32)
            .unwrap_or(0);

        let empty = Glyph {
            id: code_point,
            advance,
            ..Default::default()
        };

        let mut sink = PathSink(PathBuilder::new());
        let Some(bbox) = face.outline_glyph(id, &mut sink) else {
            return Some(empty);
        };
        let Some(path) = sink.0.finish() else {
            return Some(empty);
        };

        let left = (f32::from(bbox.x_min) * scale).floor() as i32;
        let bottom = (f32::from(bbox.y_min) * scale).floor() as i32;
        let right = (f32::from(bbox.x_max) * scale).ceil() as i32;
        let top = (f32::from(bbox.y_max) * scale).ceil() as i32;
        let width = (right - left).max(0) as u32;
        let height = (top - bottom).max(0) as u32;
        if width == 0 || height == 0 {
            return Some(empty);
        }

        let padded_width = width + 2 * self.buffer;
        let padded_height = height + 2 * self.buffer;
        let mut pixmap = Pixmap::new(padded_width, padded_height)?;
        let mut paint = Paint::default();
        paint.set_color_rgba8(0, 0, 0, 255);
        paint.anti_alias = true;

        // Font units to pixels, flipping y so the baseline sits `top` pixels down
        let buffer = self.buffer as f32;
        let transform = Transform::from_row(
            scale,
            0.0,
            0.0,
            -scale,
            buffer - left as f32,
            buffer + top as f32,
        );
        pixmap.fill_path(&path, &paint, FillRule::Winding, transform, None);

        let alpha: Vec<u8> = pixmap.data().chunks_exact(4).map(|px| px[3]).collect();
        let bitmap = distance_field(
            &alpha,
            padded_width as usize,
            padded_height as usize,
            self.radius,
            self.cutoff,
        );

        Some(Glyph {
            id: code_point,
            bitmap,
            width,
            height,
            left,
            top,
            advance,
        })
    }
}

impl GlyphRasterizer for SdfRasterizer {
    fn rasterize(&self, font: &FontData, range: GlyphRange) -> Result<Vec<Glyph>> {
        let face = Face::parse(&font.bytes, 0).map_err(|e| PantilerError::InvalidFont {
            font: font.name.clone(),
            reason: e.to_string(),
        })?;
        Ok((range.start..=range.end)
            .filter_map(|code_point| self.glyph(&face, code_point))
            .collect())
    }
}

/// Convert an alpha coverage bitmap into a signed distance field.
///
/// Values above `255 * (1 - cutoff)` are inside the shape; each step of
/// `255 / radius` is one pixel further out.
pub fn distance_field(
    alpha: &[u8],
    width: usize,
    height: usize,
    radius: f64,
    cutoff: f64,
) -> Vec<u8> {
    let len = width * height;
    let mut outer = vec![0.0; len];
    let mut inner = vec![0.0; len];
    for (i, &a) in alpha.iter().take(len).enumerate() {
        let coverage = f64::from(a) / 255.0;
        if coverage >= 1.0 {
            outer[i] = 0.0;
            inner[i] = INF;
        } else if coverage <= 0.0 {
            outer[i] = INF;
            inner[i] = 0.0;
        } else {
            let d = 0.5 - coverage;
            outer[i] = if d > 0.0 { d * d } else { 0.0 };
            inner[i] = if d < 0.0 { d * d } else { 0.0 };
        }
    }

    let longest = width.max(height);
    let mut scratch = Scratch::new(longest);
    transform_2d(&mut outer, width, height, &mut scratch);
    transform_2d(&mut inner, width, height, &mut scratch);

    outer
        .iter()
        .zip(&inner)
        .map(|(o, i)| {
            let d = o.sqrt() - i.sqrt();
            (255.0 - 255.0 * (d / radius + cutoff)).round().clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// Buffers for the one-dimensional transform.
struct Scratch {
    f: Vec<f64>,
    v: Vec<usize>,
    z: Vec<f64>,
}

impl Scratch {
    fn new(length: usize) -> Self {
        Self {
            f: vec![0.0; length],
            v: vec![0; length],
            z: vec![0.0; length + 1],
        }
    }
}

/// Squared Euclidean distance transform over a whole grid, columns then rows.
fn transform_2d(grid: &mut [f64], width: usize, height: usize, scratch: &mut Scratch) {
    for x in 0..width {
        transform_1d(grid, x, width, height, scratch);
    }
    for y in 0..height {
        transform_1d(grid, y * width, 1, width, scratch);
    }
}

/// Lower envelope of parabolas (Felzenszwalb & Huttenlocher) along one line.
fn transform_1d(grid: &mut [f64], offset: usize, stride: usize, length: usize, s: &mut Scratch) {
    if length == 0 {
        return;
    }
    s.v[0] = 0;
    s.z[0] = -INF;
    s.z[1] = INF;
    s.f[0] = grid[offset];

    let mut k = 0usize;
    for q in 1..length {
        s.f[q] = grid[offset + q * stride];
        let qf = q as f64;
        let mut intersection;
        // z[0] is -INF, so this always stops by k == 0
        loop {
            let r = s.v[k];
            let rf = r as f64;
            intersection = (s.f[q] - s.f[r] + qf * qf - rf * rf) / (qf - rf) / 2.0;
            if intersection <= s.z[k] {
                k -= 1;
            } else {
                break;
            }
        }
        k += 1;
        s.v[k] = q;
        s.z[k] = intersection;
        s.z[k + 1] = INF;
    }

    let mut k = 0usize;
    for q in 0..length {
        let qf = q as f64;
        while s.z[k + 1] < qf {
            k += 1;
        }
        let r = s.v[k];
        let d = qf - r as f64;
        grid[offset + q * stride] = s.f[r] + d * d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: usize, from: usize, to: usize) -> Vec<u8> {
        let mut alpha = vec![0u8; size * size];
        for y in from..to {
            for x in from..to {
                alpha[y * size + x] = 255;
            }
        }
        alpha
    }

    #[test]
    fn test_distance_field_inside_and_outside() {
        let alpha = square(20, 5, 15);
        let field = distance_field(&alpha, 20, 20, 8.0, 0.25);

        let at = |x: usize, y: usize| field[y * 20 + x];
        // Deep inside saturates, far outside bottoms out
        assert_eq!(at(10, 10), 255);
        assert_eq!(at(0, 0), 0);
        // Values fall off monotonically across the edge
        assert!(at(6, 10) > at(4, 10));
        assert!(at(4, 10) > at(2, 10));
        // Just inside the edge lands near the inside threshold
        let threshold = (255.0 * 0.75) as u8;
        assert!(at(5, 10) >= threshold - 16 && at(5, 10) <= threshold + 32);
    }

    #[test]
    fn test_distance_field_empty_coverage() {
        let field = distance_field(&[0u8; 16], 4, 4, 8.0, 0.25);
        assert!(field.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_transform_1d_distances() {
        let mut grid = vec![INF, 0.0, INF, INF, INF];
        let mut scratch = Scratch::new(5);
        transform_1d(&mut grid, 0, 1, 5, &mut scratch);
        assert_eq!(grid, vec![1.0, 0.0, 1.0, 4.0, 9.0]);
    }

    #[test]
    fn test_invalid_font_is_rejected() {
        let font = FontData {
            name: "Broken Sans".to_string(),
            bytes: b"not a font".to_vec(),
        };
        let err = SdfRasterizer::default()
            .rasterize(&font, GlyphRange { start: 0, end: 255 })
            .unwrap_err();
        assert!(matches!(err, PantilerError::InvalidFont { ref font, .. } if font == "Broken Sans"));
    }
}
