// ============================================================================
// DRAWING PRIMITIVES
// ============================================================================

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use rusttype::{point, Font, PositionedGlyph, Scale};

use crate::config::Color;

/// RGBA8 framebuffer view with alpha-blended, anti-aliased primitives.
pub struct Canvas<'a> {
    frame: &'a mut [u8],
    width: usize,
    height: usize,
}

impl<'a> Canvas<'a> {
    pub fn new(frame: &'a mut [u8], width: usize, height: usize) -> Self {
        debug_assert!(frame.len() >= width * height * 4);
        Self {
            frame,
            width,
            height,
        }
    }

    pub fn clear(&mut self, color: Color) {
        for chunk in self.frame.chunks_exact_mut(4) {
            chunk.copy_from_slice(&[color.r, color.g, color.b, 0xff]);
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y * self.width + x) * 4;
        let mut out = [0u8; 4];
        out.copy_from_slice(&self.frame[idx..idx + 4]);
        Some(out)
    }

    /// Blend `color` over the pixel at (x, y). Out-of-bounds writes are dropped.
    pub fn blend(&mut self, x: i32, y: i32, color: Color, alpha: f32) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return;
        }
        let a = alpha.clamp(0.0, 1.0);
        let idx = (y as usize * self.width + x as usize) * 4;
        let dst = &mut self.frame[idx..idx + 4];
        for (d, s) in dst.iter_mut().zip([color.r, color.g, color.b]) {
            *d = (s as f32 * a + *d as f32 * (1.0 - a)).round() as u8;
        }
        dst[3] = 0xff;
    }

    pub fn fill_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: Color) {
        let (x0, x1) = (x0.min(x1).max(0), x0.max(x1).min(self.width as i32));
        let (y0, y1) = (y0.min(y1).max(0), y0.max(y1).min(self.height as i32));
        for y in y0..y1 {
            for x in x0..x1 {
                self.blend(x, y, color, 1.0);
            }
        }
    }

    pub fn line(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, thickness: f32, color: Color) {
        self.stroke(x0, y0, x1, y1, thickness, color, |_| 1.0);
    }

    /// Like [`Canvas::line`], but narrowing toward (x1, y1).
    pub fn tapered_line(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, thickness: f32, color: Color) {
        // Keep 5% of the width at the tip so it does not vanish.
        self.stroke(x0, y0, x1, y1, thickness, color, |t| 1.0 - t * 0.95);
    }

    fn stroke(
        &mut self,
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        thickness: f32,
        color: Color,
        width_at: impl Fn(f32) -> f32,
    ) {
        let pad = thickness.ceil() as i32 + 1;
        let min_x = x0.min(x1).floor() as i32 - pad;
        let max_x = x0.max(x1).ceil() as i32 + pad;
        let min_y = y0.min(y1).floor() as i32 - pad;
        let max_y = y0.max(y1).ceil() as i32 + pad;
        let (x0, y0) = (x0 as f32, y0 as f32);
        let dx = x1 as f32 - x0;
        let dy = y1 as f32 - y0;
        let len_sq = (dx * dx + dy * dy).max(f32::EPSILON);
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let px = x as f32 - x0;
                let py = y as f32 - y0;
                let t = ((px * dx + py * dy) / len_sq).clamp(0.0, 1.0);
                let lx = x0 + t * dx;
                let ly = y0 + t * dy;
                let dist = ((lx - x as f32).powi(2) + (ly - y as f32).powi(2)).sqrt();
                let half = thickness * width_at(t) / 2.0;
                let aa = (1.0 - (dist - half).clamp(0.0, 1.0)).clamp(0.0, 1.0);
                if aa > 0.01 {
                    self.blend(x, y, color, aa);
                }
            }
        }
    }

    pub fn disc(&mut self, cx: f64, cy: f64, radius: f64, color: Color) {
        let reach = radius.ceil() as i32 + 1;
        let (ix, iy) = (cx.round() as i32, cy.round() as i32);
        for y in iy - reach..=iy + reach {
            for x in ix - reach..=ix + reach {
                let dist = ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt();
                let aa = if dist > radius {
                    1.0 - (dist - radius).min(1.0)
                } else {
                    1.0
                };
                if aa > 0.0 {
                    self.blend(x, y, color, aa as f32);
                }
            }
        }
    }

    /// Draw `text` centered on (x, y).
    pub fn text(&mut self, x: f64, y: f64, text: &str, font: &Font, size: f32, color: Color) {
        let scale = Scale::uniform(size);
        let v_metrics = font.v_metrics(scale);
        let glyphs: Vec<PositionedGlyph> = font
            .layout(text, scale, point(0.0, v_metrics.ascent))
            .collect();
        let Some((min_x, max_x, min_y, max_y)) = text_bounds(&glyphs) else {
            return;
        };
        let offset_x = x.round() as i32 - (max_x - min_x) / 2;
        let offset_y = y.round() as i32 - (max_y - min_y) / 2;
        for glyph in &glyphs {
            if let Some(bb) = glyph.pixel_bounding_box() {
                glyph.draw(|gx, gy, v| {
                    let px = offset_x + gx as i32 + bb.min.x - min_x;
                    let py = offset_y + gy as i32 + bb.min.y - min_y;
                    self.blend(px, py, color, v);
                });
            }
        }
    }
}

fn text_bounds(glyphs: &[PositionedGlyph]) -> Option<(i32, i32, i32, i32)> {
    glyphs
        .iter()
        .filter_map(|g| g.pixel_bounding_box())
        .fold(None, |acc, bb| {
            Some(match acc {
                None => (bb.min.x, bb.max.x, bb.min.y, bb.max.y),
                Some((min_x, max_x, min_y, max_y)) => (
                    min_x.min(bb.min.x),
                    max_x.max(bb.max.x),
                    min_y.min(bb.min.y),
                    max_y.max(bb.max.y),
                ),
            })
        })
}

// ============================================================================
// FONT LOADING
// ============================================================================

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Debug)]
pub enum FontError {
    Read { path: PathBuf, source: io::Error },
    Invalid(PathBuf),
    NotFound,
}

impl fmt::Display for FontError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FontError::Read { path, source } => write!(f, "cannot read font {}: {}", path.display(), source),
            FontError::Invalid(path) => write!(f, "{} is not a usable TrueType/OpenType font", path.display()),
            FontError::NotFound => write!(f, "no system font found; pass --font <path>"),
        }
    }
}

impl std::error::Error for FontError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FontError::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub fn load_font_file(path: &Path) -> Result<Font<'static>, FontError> {
    let data = std::fs::read(path).map_err(|source| FontError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Font::try_from_vec(data).ok_or_else(|| FontError::Invalid(path.to_path_buf()))
}

/// Load the configured font, or the first usable system font.
pub fn load_font(path: Option<&Path>) -> Result<Font<'static>, FontError> {
    if let Some(path) = path {
        return load_font_file(path);
    }
    for candidate in SYSTEM_FONTS.iter().map(Path::new).filter(|p| p.is_file()) {
        match load_font_file(candidate) {
            Ok(font) => {
                log::debug!("Using font {}", candidate.display());
                return Ok(font);
            }
            Err(e) => log::debug!("Skipping font: {}", e),
        }
    }
    Err(FontError::NotFound)
}
