use bon::Builder;
use std::path::PathBuf;
use std::time::Duration;

/// Color representation for meter elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0x00, 0x00, 0x00);
    pub const WHITE: Color = Color::new(0xff, 0xff, 0xff);
    pub const RED: Color = Color::new(0xff, 0x00, 0x00);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Where samples come from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// The microcontroller on `port_name`.
    #[default]
    Serial,
    /// Newline-separated counts piped on standard input.
    Stdin,
    /// A random walk over the full ADC range, for running without hardware.
    Simulated,
}

/// What to do with a line that does not parse as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Stop acquisition and close the meter.
    #[default]
    Stop,
    /// Log it and keep the last good reading on screen.
    Skip,
}

#[cfg(windows)]
const DEFAULT_PORT: &str = "COM3";
#[cfg(not(windows))]
const DEFAULT_PORT: &str = "/dev/ttyACM0";

#[derive(Debug, Clone, Builder)]
pub struct VoltmeterConfig {
    #[builder(default = "Analog Voltmeter".to_string())]
    pub title: String,

    // Sample source
    #[builder(default)]
    pub source: SourceKind,
    #[builder(default = DEFAULT_PORT.to_string())]
    pub port_name: String,
    #[builder(default = 115_200)]
    pub baud_rate: u32,
    #[builder(default = Duration::from_millis(100))]
    pub read_timeout: Duration,
    #[builder(default = Duration::from_secs(1))]
    pub settle_delay: Duration,
    #[builder(default = Duration::from_millis(20))]
    pub simulated_interval: Duration,
    #[builder(default)]
    pub malformed_policy: MalformedPolicy,

    // Window configuration
    #[builder(default = 640)]
    pub window_width: usize,
    #[builder(default = 400)]
    pub window_height: usize,
    #[builder(default = 250.0)]
    pub refresh_rate: f64,

    /// Size of the meter relative to the window; 1.0 fills it.
    #[builder(default = 1.0)]
    pub meter_scale: f64,

    /// Falls back to common system font locations when unset.
    pub font_path: Option<PathBuf>,

    // Colors
    #[builder(default = Color::BLACK)]
    pub background_color: Color,
    #[builder(default = Color::WHITE)]
    pub face_color: Color,
    #[builder(default = Color::BLACK)]
    pub tick_color: Color,
    #[builder(default = Color::RED)]
    pub needle_color: Color,
    #[builder(default = Color::RED)]
    pub text_color: Color,
}

impl Default for VoltmeterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_bench_setup() {
        let config = VoltmeterConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.refresh_rate, 250.0);
        assert_eq!(config.meter_scale, 1.0);
        assert_eq!(config.settle_delay, Duration::from_secs(1));
        assert_eq!(config.source, SourceKind::Serial);
        assert_eq!(config.malformed_policy, MalformedPolicy::Stop);
        assert!(config.font_path.is_none());
    }

    #[test]
    fn builder_overrides_individual_fields() {
        let config = VoltmeterConfig::builder()
            .port_name("/dev/ttyUSB1".to_string())
            .malformed_policy(MalformedPolicy::Skip)
            .maybe_font_path(Some(PathBuf::from("/tmp/font.ttf")))
            .build();
        assert_eq!(config.port_name, "/dev/ttyUSB1");
        assert_eq!(config.malformed_policy, MalformedPolicy::Skip);
        assert_eq!(config.font_path, Some(PathBuf::from("/tmp/font.ttf")));
        assert_eq!(config.baud_rate, 115_200);
    }
}
