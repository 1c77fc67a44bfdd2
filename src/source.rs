//! Line-oriented sample sources.
//!
//! Every source hands back one raw line at a time. A read that times out is
//! not an error: it yields `Ok(None)` so the caller can check whether it
//! should keep waiting.

use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::config::{SourceKind, VoltmeterConfig};

pub trait SampleSource: Send {
    /// Next complete line, without its terminator, or `None` if nothing
    /// arrived within the source's timeout.
    fn poll_line(&mut self) -> Result<Option<Vec<u8>>, SourceError>;

    fn describe(&self) -> String;
}

#[derive(Debug)]
pub enum SourceError {
    Open { port: String, source: serialport::Error },
    Io(io::Error),
    Closed,
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Open { port, source } => write!(f, "failed to open {}: {}", port, source),
            SourceError::Io(e) => write!(f, "read failed: {}", e),
            SourceError::Closed => write!(f, "sample stream closed"),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::Open { source, .. } => Some(source),
            SourceError::Io(e) => Some(e),
            SourceError::Closed => None,
        }
    }
}

impl From<io::Error> for SourceError {
    fn from(e: io::Error) -> Self {
        SourceError::Io(e)
    }
}

/// Open whichever source the configuration asks for.
pub fn open(config: &VoltmeterConfig) -> Result<Box<dyn SampleSource>, SourceError> {
    match config.source {
        SourceKind::Serial => {
            let source = SerialSource::open(&config.port_name, config.baud_rate, config.read_timeout)?;
            if !config.settle_delay.is_zero() {
                log::info!("Waiting {:?} for {} to settle", config.settle_delay, config.port_name);
                thread::sleep(config.settle_delay);
            }
            Ok(Box::new(source))
        }
        SourceKind::Stdin => Ok(Box::new(LineReader::new(
            BufReader::new(io::stdin()),
            "stdin".to_string(),
        ))),
        SourceKind::Simulated => Ok(Box::new(SimulatedSource::new(config.simulated_interval))),
    }
}

// ============================================================================
// LINE REASSEMBLY
// ============================================================================

/// Longest line accepted before the bytes are handed on unterminated.
/// A reading is at most a handful of digits, so anything longer is noise.
pub const MAX_LINE_LEN: usize = 64;

/// Splits any byte stream into lines, keeping partial data across timeouts.
pub struct LineReader<R> {
    reader: R,
    pending: Vec<u8>,
    name: String,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(reader: R, name: String) -> Self {
        Self {
            reader,
            pending: Vec::with_capacity(16),
            name,
        }
    }
}

impl<R: BufRead + Send> SampleSource for LineReader<R> {
    fn poll_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        let limit = MAX_LINE_LEN.saturating_sub(self.pending.len()) as u64;
        match (&mut self.reader).take(limit).read_until(b'\n', &mut self.pending) {
            Ok(0) => {
                // A final line without a terminator still counts.
                if self.pending.is_empty() {
                    Err(SourceError::Closed)
                } else {
                    Ok(Some(std::mem::take(&mut self.pending)))
                }
            }
            Ok(_) if self.pending.ends_with(b"\n") => {
                let mut line = std::mem::take(&mut self.pending);
                line.pop();
                Ok(Some(line))
            }
            Ok(_) if self.pending.len() >= MAX_LINE_LEN => {
                log::warn!("{}: no line terminator within {} bytes", self.name, MAX_LINE_LEN);
                Ok(Some(std::mem::take(&mut self.pending)))
            }
            Ok(_) => Ok(None),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

// ============================================================================
// SERIAL PORT
// ============================================================================

pub struct SerialSource {
    lines: LineReader<BufReader<Box<dyn serialport::SerialPort>>>,
}

impl SerialSource {
    pub fn open(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<Self, SourceError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|source| SourceError::Open {
                port: port_name.to_string(),
                source,
            })?;
        log::info!("Opened {} at {} baud", port_name, baud_rate);
        Ok(Self {
            lines: LineReader::new(BufReader::new(port), format!("{} @ {}", port_name, baud_rate)),
        })
    }
}

impl SampleSource for SerialSource {
    fn poll_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        self.lines.poll_line()
    }

    fn describe(&self) -> String {
        self.lines.describe()
    }
}

// ============================================================================
// SIMULATION
// ============================================================================

/// Wanders across the ADC range, drifting toward a target that changes now and then.
pub struct SimulatedSource {
    value: f64,
    target: f64,
    interval: Duration,
}

impl SimulatedSource {
    const MAX_COUNT: f64 = 1023.0;

    pub fn new(interval: Duration) -> Self {
        Self {
            value: 0.0,
            target: Self::MAX_COUNT / 2.0,
            interval,
        }
    }

    fn advance(&mut self, rng: &mut impl Rng) -> i64 {
        if rng.random_range(0.0..1.0) < 0.02 {
            self.target = rng.random_range(0.0..=Self::MAX_COUNT);
        }
        let jitter = rng.random_range(-4.0..4.0);
        self.value = (self.value + (self.target - self.value) * 0.05 + jitter).clamp(0.0, Self::MAX_COUNT);
        self.value.round() as i64
    }
}

impl SampleSource for SimulatedSource {
    fn poll_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        thread::sleep(self.interval);
        let count = self.advance(&mut rand::rng());
        Ok(Some(format!("{}\r", count).into_bytes()))
    }

    fn describe(&self) -> String {
        "simulated ADC".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Cursor;

    /// Replays chunks of bytes, with `None` standing for a read timeout.
    struct Scripted {
        chunks: VecDeque<Option<Vec<u8>>>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Some(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                Some(None) => Err(io::Error::new(io::ErrorKind::TimedOut, "timed out")),
                None => Ok(0),
            }
        }
    }

    fn scripted(chunks: Vec<Option<&[u8]>>) -> LineReader<BufReader<Scripted>> {
        let chunks = chunks.into_iter().map(|c| c.map(|b| b.to_vec())).collect();
        LineReader::new(BufReader::new(Scripted { chunks }), "scripted".to_string())
    }

    #[test]
    fn yields_each_line_then_closes() {
        let mut lines = LineReader::new(Cursor::new(b"1\r\n512\r\n".to_vec()), "cursor".to_string());
        assert_eq!(lines.poll_line().unwrap(), Some(b"1\r".to_vec()));
        assert_eq!(lines.poll_line().unwrap(), Some(b"512\r".to_vec()));
        assert!(matches!(lines.poll_line(), Err(SourceError::Closed)));
    }

    #[test]
    fn unterminated_last_line_is_delivered() {
        let mut lines = LineReader::new(Cursor::new(b"99".to_vec()), "cursor".to_string());
        assert_eq!(lines.poll_line().unwrap(), Some(b"99".to_vec()));
        assert!(matches!(lines.poll_line(), Err(SourceError::Closed)));
    }

    #[test]
    fn partial_line_survives_a_timeout() {
        let mut lines = scripted(vec![Some(&b"10"[..]), None, Some(&b"23\r\n"[..])]);
        assert_eq!(lines.poll_line().unwrap(), None);
        assert_eq!(lines.poll_line().unwrap(), Some(b"1023\r".to_vec()));
    }

    #[test]
    fn timeout_with_nothing_pending_is_idle() {
        let mut lines = scripted(vec![None, Some(&b"5\n"[..])]);
        assert_eq!(lines.poll_line().unwrap(), None);
        assert_eq!(lines.poll_line().unwrap(), Some(b"5".to_vec()));
    }

    #[test]
    fn runaway_line_is_cut_at_the_length_limit() {
        let mut input = vec![b'7'; MAX_LINE_LEN + 10];
        input.extend_from_slice(b"\n42\n");
        let mut lines = LineReader::new(Cursor::new(input), "cursor".to_string());
        assert_eq!(lines.poll_line().unwrap(), Some(vec![b'7'; MAX_LINE_LEN]));
        assert_eq!(lines.poll_line().unwrap(), Some(vec![b'7'; 10]));
        assert_eq!(lines.poll_line().unwrap(), Some(b"42".to_vec()));
    }

    #[test]
    fn unterminated_trickle_never_outgrows_the_limit() {
        let chunk = [b'x'; 20];
        let mut script: Vec<Option<&[u8]>> = Vec::new();
        for _ in 0..4 {
            script.push(Some(&chunk[..]));
            script.push(None);
        }
        let mut lines = scripted(script);
        let mut delivered = Vec::new();
        for _ in 0..4 {
            if let Some(line) = lines.poll_line().unwrap() {
                delivered.push(line);
            }
            assert!(lines.pending.len() < MAX_LINE_LEN);
        }
        assert_eq!(delivered, vec![vec![b'x'; MAX_LINE_LEN]]);
        assert!(crate::mapping::Reading::parse_line(&delivered[0]).is_err());
    }

    #[test]
    fn simulated_counts_stay_in_adc_range() {
        let mut sim = SimulatedSource::new(Duration::ZERO);
        let mut rng = rand::rng();
        for _ in 0..2_000 {
            let count = sim.advance(&mut rng);
            assert!((0..=1023).contains(&count));
        }
    }

    #[test]
    fn simulated_lines_parse_as_readings() {
        let mut sim = SimulatedSource::new(Duration::ZERO);
        let line = sim.poll_line().unwrap().unwrap();
        assert!(crate::mapping::Reading::parse_line(&line).is_ok());
    }
}
