//! Conversion of raw 10-bit ADC counts into the quantities shown on the meter.

use std::f64::consts::PI;
use std::fmt;

/// Angle of the needle at a raw count of zero (left end of the scale).
pub const ANGLE_AT_ZERO: f64 = 5.0 * PI / 6.0;

/// Angle of the right end of the scale. The needle never quite reaches it
/// because the step below spreads the span over 1024 counts.
pub const ANGLE_FULL_SCALE: f64 = PI / 6.0;

/// Needle travel per raw count: 4π/6 spread over 1024 counts.
pub const ANGLE_PER_COUNT: f64 = PI / 1536.0;

/// Reference voltage of the converter.
pub const REFERENCE_VOLTS: f64 = 5.0;

/// Divisor used for the voltage scale. Intentionally 1024, not 1023.
pub const COUNTS: f64 = 1024.0;

/// One raw sample, as received from the microcontroller.
///
/// Nominally in `0..=1023`, but nothing enforces that: out-of-range values
/// extrapolate through [`voltage`] and [`needle_angle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading(pub i64);

impl Reading {
    pub fn voltage(self) -> f64 {
        voltage(self.0)
    }

    pub fn needle_angle(self) -> f64 {
        needle_angle(self.0)
    }

    /// Decode one line of serial input.
    ///
    /// Line-ending characters are stripped from both ends and surrounding
    /// whitespace is ignored; anything else that is not a signed decimal
    /// integer is rejected.
    pub fn parse_line(bytes: &[u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ParseError::NotUtf8)?;
        let trimmed = text.trim_matches(|c| c == '\r' || c == '\n').trim();
        if trimmed.is_empty() {
            return Err(ParseError::Empty);
        }
        trimmed
            .parse::<i64>()
            .map(Reading)
            .map_err(|_| ParseError::NotAnInteger(trimmed.to_string()))
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    NotUtf8,
    Empty,
    NotAnInteger(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::NotUtf8 => write!(f, "line is not valid UTF-8"),
            ParseError::Empty => write!(f, "line is empty"),
            ParseError::NotAnInteger(text) => write!(f, "{:?} is not an integer", text),
        }
    }
}

impl std::error::Error for ParseError {}

/// Voltage for a raw count, rounded to two decimals (ties to even).
pub fn voltage(raw: i64) -> f64 {
    round2(REFERENCE_VOLTS * raw as f64 / COUNTS)
}

/// Needle angle in radians, measured counter-clockwise from the positive x axis.
pub fn needle_angle(raw: i64) -> f64 {
    ANGLE_AT_ZERO - ANGLE_PER_COUNT * raw as f64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
