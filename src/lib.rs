// ============================================================================
// CRATE CONFIGURATION & IMPORTS
// ============================================================================

pub mod acquisition;
pub mod config;
pub mod mapping;
pub mod raster;
pub mod scene;
pub mod source;

// External crate imports
use pixels::{Pixels, SurfaceTexture};
use rusttype::Font;

// Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// Window management imports
use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

pub use acquisition::{AcquisitionError, AcquisitionEvent};
pub use config::{Color, MalformedPolicy, SourceKind, VoltmeterConfig};
pub use mapping::Reading;
pub use scene::GaugeDisplay;

use raster::Canvas;
use scene::Viewport;
use source::SampleSource;

// ============================================================================
// PUBLIC API - MAIN INTERFACE
// ============================================================================

/// An analog voltmeter window fed by a line-oriented sample source.
pub struct Voltmeter {
    config: VoltmeterConfig,
    font: Font<'static>,
}

impl Voltmeter {
    /// Load the font up front so a missing font fails before any window opens.
    pub fn new(config: VoltmeterConfig) -> Result<Self, raster::FontError> {
        let font = raster::load_font(config.font_path.as_deref())?;
        Ok(Self { config, font })
    }

    /// Open the configured source and run until the window closes or
    /// acquisition halts. A halt is returned as the error.
    pub fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let source = source::open(&self.config)?;
        self.run_with_source(source)
    }

    pub fn run_with_source(&self, source: Box<dyn SampleSource>) -> Result<(), Box<dyn std::error::Error>> {
        let running = Arc::new(AtomicBool::new(true));
        let (sender, receiver) = mpsc::channel();
        let acquisition =
            acquisition::Acquisition::new(source, self.config.malformed_policy, running.clone());
        thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || acquisition.run(sender))?;

        let result = self.show(receiver);
        running.store(false, Ordering::Relaxed);
        result
    }

    fn show(&self, receiver: Receiver<AcquisitionEvent>) -> Result<(), Box<dyn std::error::Error>> {
        let event_loop = EventLoop::new()?;
        let window = WindowBuilder::new()
            .with_title(&self.config.title)
            .with_inner_size(LogicalSize::new(
                self.config.window_width as f64,
                self.config.window_height as f64,
            ))
            .build(&event_loop)?;

        let window = Arc::new(window);
        let window_clone = window.clone();
        let size = window.inner_size();
        let surface_texture = SurfaceTexture::new(size.width, size.height, &window);
        let mut pixels = Pixels::new(size.width, size.height, surface_texture)?;

        let mut face = FaceCache::new(size.width as usize, size.height as usize, &self.config, &self.font);
        let mut display = GaugeDisplay::new();
        let mut halted: Option<AcquisitionError> = None;

        let frame_duration = Duration::from_secs_f64(1.0 / self.config.refresh_rate);
        let mut last_frame = Instant::now();

        let halted_ref = &mut halted;
        event_loop.run(move |event, window_target| {
            window_target.set_control_flow(ControlFlow::Poll);
            match event {
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested => {
                        window_target.exit();
                    }
                    WindowEvent::Resized(new_size) => {
                        if new_size.width == 0 || new_size.height == 0 {
                            return;
                        }
                        if let Err(e) = pixels.resize_buffer(new_size.width, new_size.height) {
                            log::error!("Resizing the pixel buffer failed: {}", e);
                        }
                        if let Err(e) = pixels.resize_surface(new_size.width, new_size.height) {
                            log::error!("Resizing the surface failed: {}", e);
                        }
                        face = FaceCache::new(
                            new_size.width as usize,
                            new_size.height as usize,
                            &self.config,
                            &self.font,
                        );
                    }
                    WindowEvent::RedrawRequested => {
                        if let Some(error) = drain_events(&receiver, &mut display) {
                            *halted_ref = Some(error);
                            window_target.exit();
                            return;
                        }
                        if !face.render(pixels.frame_mut(), &display, &self.config, &self.font) {
                            return;
                        }
                        if let Err(e) = pixels.render() {
                            log::error!("Render failed: {}", e);
                            window_target.exit();
                        }
                    }
                    _ => {}
                },
                Event::AboutToWait => {
                    if last_frame.elapsed() >= frame_duration {
                        window_clone.request_redraw();
                        last_frame = Instant::now();
                    } else {
                        window_target.set_control_flow(ControlFlow::WaitUntil(last_frame + frame_duration));
                    }
                }
                _ => {}
            }
        })?;

        match halted {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

/// Apply every reading that arrived since the last frame. Returns the halt
/// reason if acquisition has stopped.
fn drain_events(receiver: &Receiver<AcquisitionEvent>, display: &mut GaugeDisplay) -> Option<AcquisitionError> {
    loop {
        match receiver.try_recv() {
            Ok(AcquisitionEvent::Sample(reading)) => display.apply(reading),
            Ok(AcquisitionEvent::Halted(error)) => return Some(error),
            // The sender only drops after a halt has been delivered or once we asked it to stop.
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
        }
    }
}

// ============================================================================
// FRAME COMPOSITION
// ============================================================================

/// The static face rasterized once per framebuffer size.
struct FaceCache {
    width: usize,
    height: usize,
    viewport: Viewport,
    background: Vec<u8>,
}

impl FaceCache {
    fn new(width: usize, height: usize, config: &VoltmeterConfig, font: &Font) -> Self {
        let viewport = Viewport::fit(width, height, config.meter_scale);
        let mut background = vec![0u8; width * height * 4];
        let mut canvas = Canvas::new(&mut background, width, height);
        scene::build_static_scene(&viewport, config).render(&mut canvas, font);
        log::debug!("Built meter face at {}x{}", width, height);
        Self {
            width,
            height,
            viewport,
            background,
        }
    }

    /// Compose the face and the current reading into `frame`. Returns false,
    /// leaving the frame alone, when its size is not the one the face was built for.
    fn render(&self, frame: &mut [u8], display: &GaugeDisplay, config: &VoltmeterConfig, font: &Font) -> bool {
        if !self.fits(frame) {
            log::warn!(
                "Frame is {} bytes but the face is {} bytes; skipping redraw",
                frame.len(),
                self.background.len()
            );
            return false;
        }
        frame.copy_from_slice(&self.background);
        let mut canvas = Canvas::new(frame, self.width, self.height);
        display.scene(&self.viewport, config).render(&mut canvas, font);
        true
    }

    fn fits(&self, frame: &[u8]) -> bool {
        frame.len() == self.background.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_leaves_the_latest_reading_on_display() {
        let (tx, rx) = mpsc::channel();
        tx.send(AcquisitionEvent::Sample(Reading(100))).unwrap();
        tx.send(AcquisitionEvent::Sample(Reading(900))).unwrap();
        let mut display = GaugeDisplay::new();
        assert!(drain_events(&rx, &mut display).is_none());
        assert_eq!(display.reading(), Some(Reading(900)));
    }

    #[test]
    fn drain_reports_a_halt_and_keeps_the_last_value() {
        let (tx, rx) = mpsc::channel();
        tx.send(AcquisitionEvent::Sample(Reading(42))).unwrap();
        tx.send(AcquisitionEvent::Halted(AcquisitionError::Source(
            source::SourceError::Closed,
        )))
        .unwrap();
        let mut display = GaugeDisplay::new();
        let halt = drain_events(&rx, &mut display);
        assert!(matches!(
            halt,
            Some(AcquisitionError::Source(source::SourceError::Closed))
        ));
        assert_eq!(display.raw_text(), "0042");
    }

    #[test]
    fn face_only_fits_the_frame_size_it_was_built_for() {
        let face = FaceCache {
            width: 4,
            height: 2,
            viewport: Viewport::fit(4, 2, 1.0),
            background: vec![0; 4 * 2 * 4],
        };
        assert!(face.fits(&[0; 32]));
        // A resize_buffer failure leaves pixels at the old size.
        assert!(!face.fits(&[0; 8 * 2 * 4]));
        assert!(!face.fits(&[]));
    }

    #[test]
    fn drain_with_no_events_leaves_display_untouched() {
        let (_tx, rx) = mpsc::channel::<AcquisitionEvent>();
        let mut display = GaugeDisplay::new();
        assert!(drain_events(&rx, &mut display).is_none());
        assert_eq!(display, GaugeDisplay::new());
    }
}
