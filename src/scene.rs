//! Meter layout: the static face built once, and the needle and labels that follow readings.
//!
//! Geometry is expressed in meter units (needle length = 1.0 at scale 1.0)
//! with y pointing up and the needle pivot at the origin. [`Viewport`] maps
//! those units onto the framebuffer.

use rusttype::Font;

use crate::config::{Color, VoltmeterConfig};
use crate::mapping::{self, Reading};
use crate::raster::Canvas;

// ============================================================================
// METER DIMENSIONS (meter units, before scaling)
// ============================================================================

const BOX_WIDTH: f64 = 2.5;
const BOX_HEIGHT: f64 = 1.5;
const NEEDLE_LENGTH: f64 = 1.0;
const NEEDLE_WIDTH: f64 = 0.02;
const NEEDLE_BASE_RADIUS: f64 = 0.05;

const MAJOR_TICKS: usize = 6;
const MAJOR_TICK_LENGTH: f64 = 0.1;
const MAJOR_TICK_WIDTH: f64 = 0.02;
const MINOR_TICKS: usize = 51;
const MINOR_TICK_LENGTH: f64 = 0.05;
const MINOR_TICK_WIDTH: f64 = 0.01;

const SCALE_LABEL_OFFSET: f64 = 0.15;
const HEADER_OFFSET: f64 = 0.25;
const READOUT_X: f64 = 0.9;

// Text heights, as a fraction of a meter unit.
const HEADER_TEXT_HEIGHT: f64 = 0.13;
const SCALE_TEXT_HEIGHT: f64 = 0.09;

/// Gap left around the meter box when fitting it into the window.
const FIT_MARGIN: f64 = 1.04;

// ============================================================================
// VIEWPORT
// ============================================================================

/// Maps meter coordinates to framebuffer pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixels_per_unit: f64,
}

impl Viewport {
    /// Center the meter box in a `width` x `height` framebuffer. At
    /// `meter_scale` 1.0 the box just fits.
    pub fn fit(width: usize, height: usize, meter_scale: f64) -> Self {
        let box_w = BOX_WIDTH * FIT_MARGIN;
        let box_h = BOX_HEIGHT * FIT_MARGIN;
        let pixels_per_unit = (width as f64 / box_w).min(height as f64 / box_h);
        Self {
            origin_x: width as f64 / 2.0,
            origin_y: height as f64 / 2.0 + box_center_y(meter_scale) * pixels_per_unit,
            pixels_per_unit,
        }
    }

    pub fn to_pixels(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.origin_x + x * self.pixels_per_unit,
            self.origin_y - y * self.pixels_per_unit,
        )
    }

    pub fn length(&self, units: f64) -> f64 {
        units * self.pixels_per_unit
    }
}

/// The box sits slightly low so the pivot lands near its bottom edge.
fn box_center_y(meter_scale: f64) -> f64 {
    0.9 * BOX_HEIGHT * meter_scale / 2.0
}

/// `count` angles evenly spaced from the zero end of the scale to the full-scale end.
pub fn scale_angles(count: usize) -> impl Iterator<Item = f64> {
    let step = if count > 1 {
        (mapping::ANGLE_FULL_SCALE - mapping::ANGLE_AT_ZERO) / (count - 1) as f64
    } else {
        0.0
    };
    (0..count).map(move |i| mapping::ANGLE_AT_ZERO + step * i as f64)
}

// ============================================================================
// RETAINED MODE ABSTRACTIONS
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    Clear(Color),
    Rect {
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        color: Color,
    },
    Tick {
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        thickness: f32,
        major: bool,
        color: Color,
    },
    Text {
        x: f64,
        y: f64,
        text: String,
        font_size: f32,
        color: Color,
    },
    Needle {
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        thickness: f32,
        color: Color,
    },
    Disc {
        cx: f64,
        cy: f64,
        radius: f64,
        color: Color,
    },
}

#[derive(Debug, Default)]
pub struct Scene {
    commands: Vec<DrawCommand>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_command(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn render(&self, canvas: &mut Canvas, font: &Font) {
        for command in &self.commands {
            match command {
                DrawCommand::Clear(color) => canvas.clear(*color),
                DrawCommand::Rect {
                    x0,
                    y0,
                    x1,
                    y1,
                    color,
                } => canvas.fill_rect(
                    x0.round() as i32,
                    y0.round() as i32,
                    x1.round() as i32,
                    y1.round() as i32,
                    *color,
                ),
                DrawCommand::Tick {
                    x0,
                    y0,
                    x1,
                    y1,
                    thickness,
                    color,
                    ..
                } => canvas.line(*x0, *y0, *x1, *y1, *thickness, *color),
                DrawCommand::Text {
                    x,
                    y,
                    text,
                    font_size,
                    color,
                } => canvas.text(*x, *y, text, font, *font_size, *color),
                DrawCommand::Needle {
                    x0,
                    y0,
                    x1,
                    y1,
                    thickness,
                    color,
                } => canvas.tapered_line(*x0, *y0, *x1, *y1, *thickness, *color),
                DrawCommand::Disc {
                    cx,
                    cy,
                    radius,
                    color,
                } => canvas.disc(*cx, *cy, *radius, *color),
            }
        }
    }
}

// ============================================================================
// STATIC FACE
// ============================================================================

/// Everything that never moves: housing, scale marks, scale numbers, title.
pub fn build_static_scene(viewport: &Viewport, config: &VoltmeterConfig) -> Scene {
    let s = config.meter_scale;
    let mut scene = Scene::new();
    scene.add_command(DrawCommand::Clear(config.background_color));

    let (x0, y0) = viewport.to_pixels(-BOX_WIDTH * s / 2.0, box_center_y(s) + BOX_HEIGHT * s / 2.0);
    let (x1, y1) = viewport.to_pixels(BOX_WIDTH * s / 2.0, box_center_y(s) - BOX_HEIGHT * s / 2.0);
    scene.add_command(DrawCommand::Rect {
        x0,
        y0,
        x1,
        y1,
        color: config.face_color,
    });

    let radius = NEEDLE_LENGTH * s;
    let scale_font = text_size(viewport, SCALE_TEXT_HEIGHT * s);
    for (unit, angle) in scale_angles(MAJOR_TICKS).enumerate() {
        add_tick(&mut scene, viewport, radius, angle, MAJOR_TICK_LENGTH * s, MAJOR_TICK_WIDTH * s, true, config);
        let label_r = radius + SCALE_LABEL_OFFSET * s;
        let (x, y) = viewport.to_pixels(label_r * angle.cos(), label_r * angle.sin());
        scene.add_command(DrawCommand::Text {
            x,
            y,
            text: unit.to_string(),
            font_size: scale_font,
            color: config.text_color,
        });
    }
    for angle in scale_angles(MINOR_TICKS) {
        add_tick(&mut scene, viewport, radius, angle, MINOR_TICK_LENGTH * s, MINOR_TICK_WIDTH * s, false, config);
    }

    let (x, y) = viewport.to_pixels(0.0, radius + HEADER_OFFSET * s);
    scene.add_command(DrawCommand::Text {
        x,
        y,
        text: "Volts".to_string(),
        font_size: text_size(viewport, HEADER_TEXT_HEIGHT * s),
        color: config.text_color,
    });
    scene
}

/// A tick is a short bar centered on the scale circle, aligned with its radius.
fn add_tick(
    scene: &mut Scene,
    viewport: &Viewport,
    radius: f64,
    angle: f64,
    length: f64,
    width: f64,
    major: bool,
    config: &VoltmeterConfig,
) {
    let (inner, outer) = (radius - length / 2.0, radius + length / 2.0);
    let (x0, y0) = viewport.to_pixels(inner * angle.cos(), inner * angle.sin());
    let (x1, y1) = viewport.to_pixels(outer * angle.cos(), outer * angle.sin());
    scene.add_command(DrawCommand::Tick {
        x0,
        y0,
        x1,
        y1,
        thickness: stroke_width(viewport, width),
        major,
        color: config.tick_color,
    });
}

fn text_size(viewport: &Viewport, units: f64) -> f32 {
    viewport.length(units).max(8.0) as f32
}

fn stroke_width(viewport: &Viewport, units: f64) -> f32 {
    viewport.length(units).max(1.0) as f32
}

// ============================================================================
// DYNAMIC STATE
// ============================================================================

/// The parts of the meter that follow the latest reading.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeDisplay {
    reading: Option<Reading>,
    needle_angle: f64,
    voltage: f64,
    raw_text: String,
    voltage_text: String,
}

impl Default for GaugeDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl GaugeDisplay {
    /// Needle parked at zero, labels showing `0000` and `0.00V`.
    pub fn new() -> Self {
        Self {
            reading: None,
            needle_angle: mapping::needle_angle(0),
            voltage: mapping::voltage(0),
            raw_text: Reading(0).to_string(),
            voltage_text: format_voltage(mapping::voltage(0)),
        }
    }

    /// Recompute everything from `reading` alone.
    pub fn apply(&mut self, reading: Reading) {
        self.reading = Some(reading);
        self.needle_angle = reading.needle_angle();
        self.voltage = reading.voltage();
        self.raw_text = reading.to_string();
        self.voltage_text = format_voltage(self.voltage);
    }

    pub fn reading(&self) -> Option<Reading> {
        self.reading
    }

    pub fn needle_angle(&self) -> f64 {
        self.needle_angle
    }

    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn voltage_text(&self) -> &str {
        &self.voltage_text
    }

    /// Needle, pivot and both readouts, drawn over the static face.
    pub fn scene(&self, viewport: &Viewport, config: &VoltmeterConfig) -> Scene {
        let s = config.meter_scale;
        let mut scene = Scene::new();
        let length = NEEDLE_LENGTH * s;
        let (px, py) = viewport.to_pixels(0.0, 0.0);
        let (tx, ty) = viewport.to_pixels(
            length * self.needle_angle.cos(),
            length * self.needle_angle.sin(),
        );
        scene.add_command(DrawCommand::Needle {
            x0: px,
            y0: py,
            x1: tx,
            y1: ty,
            thickness: stroke_width(viewport, NEEDLE_WIDTH * s * 2.0),
            color: config.needle_color,
        });
        scene.add_command(DrawCommand::Disc {
            cx: px,
            cy: py,
            radius: viewport.length(NEEDLE_BASE_RADIUS * s),
            color: config.needle_color,
        });

        let header_y = length + HEADER_OFFSET * s;
        let font_size = text_size(viewport, HEADER_TEXT_HEIGHT * s);
        for (x, text) in [(-READOUT_X * s, &self.raw_text), (READOUT_X * s, &self.voltage_text)] {
            let (x, y) = viewport.to_pixels(x, header_y);
            scene.add_command(DrawCommand::Text {
                x,
                y,
                text: text.clone(),
                font_size,
                color: config.text_color,
            });
        }
        scene
    }
}

fn format_voltage(voltage: f64) -> String {
    format!("{:.2}V", voltage)
}
