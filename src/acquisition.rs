//! The sample loop: pull lines from a source, parse them, hand readings to the display.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::config::MalformedPolicy;
use crate::mapping::{ParseError, Reading};
use crate::source::{SampleSource, SourceError};

/// Messages from the acquisition thread to the window.
#[derive(Debug)]
pub enum AcquisitionEvent {
    Sample(Reading),
    Halted(AcquisitionError),
}

/// Why acquisition stopped for good.
#[derive(Debug)]
pub enum AcquisitionError {
    Source(SourceError),
    Malformed(SampleError),
}

impl fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionError::Source(e) => write!(f, "{}", e),
            AcquisitionError::Malformed(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AcquisitionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AcquisitionError::Source(e) => Some(e),
            AcquisitionError::Malformed(e) => Some(e),
        }
    }
}

impl From<SourceError> for AcquisitionError {
    fn from(e: SourceError) -> Self {
        AcquisitionError::Source(e)
    }
}

/// A single line that could not be turned into a reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleError {
    pub line: String,
    pub reason: ParseError,
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed sample {:?}: {}", self.line, self.reason)
    }
}

impl std::error::Error for SampleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.reason)
    }
}

/// Outcome of one pass through the loop.
#[derive(Debug)]
pub enum Step {
    /// Nothing arrived before the read timeout.
    Idle,
    Sample(Reading),
    /// A bad line was dropped; the display keeps its last reading.
    Skipped(SampleError),
    Stop(AcquisitionError),
}

pub struct Acquisition {
    source: Box<dyn SampleSource>,
    policy: MalformedPolicy,
    running: Arc<AtomicBool>,
}

impl Acquisition {
    pub fn new(source: Box<dyn SampleSource>, policy: MalformedPolicy, running: Arc<AtomicBool>) -> Self {
        Self {
            source,
            policy,
            running,
        }
    }

    pub fn step(&mut self) -> Step {
        let line = match self.source.poll_line() {
            Ok(Some(line)) => line,
            Ok(None) => return Step::Idle,
            Err(e) => return Step::Stop(e.into()),
        };
        match Reading::parse_line(&line) {
            Ok(reading) => Step::Sample(reading),
            Err(reason) => {
                let error = SampleError {
                    line: String::from_utf8_lossy(&line).into_owned(),
                    reason,
                };
                match self.policy {
                    MalformedPolicy::Skip => Step::Skipped(error),
                    MalformedPolicy::Stop => Step::Stop(AcquisitionError::Malformed(error)),
                }
            }
        }
    }

    /// Loop until the window goes away or the source fails.
    pub fn run(mut self, events: Sender<AcquisitionEvent>) {
        log::info!("Reading samples from {}", self.source.describe());
        let mut skipped = 0u64;
        while self.running.load(Ordering::Relaxed) {
            match self.step() {
                Step::Idle => {}
                Step::Sample(reading) => {
                    log::trace!("raw {} -> {:.2}V", reading, reading.voltage());
                    if events.send(AcquisitionEvent::Sample(reading)).is_err() {
                        break;
                    }
                }
                Step::Skipped(error) => {
                    skipped += 1;
                    log::warn!("Skipping {} ({} skipped so far)", error, skipped);
                }
                Step::Stop(error) => {
                    log::error!("Acquisition stopped: {}", error);
                    let _ = events.send(AcquisitionEvent::Halted(error));
                    break;
                }
            }
        }
        log::debug!("Acquisition loop finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::mpsc::channel;

    /// Hands out canned results; `Closed` once exhausted.
    struct Canned(VecDeque<Option<&'static [u8]>>);

    impl SampleSource for Canned {
        fn poll_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
            match self.0.pop_front() {
                Some(line) => Ok(line.map(|l| l.to_vec())),
                None => Err(SourceError::Closed),
            }
        }

        fn describe(&self) -> String {
            "canned".to_string()
        }
    }

    fn acquisition(lines: Vec<Option<&'static [u8]>>, policy: MalformedPolicy) -> Acquisition {
        Acquisition::new(
            Box::new(Canned(lines.into())),
            policy,
            Arc::new(AtomicBool::new(true)),
        )
    }

    #[test]
    fn steps_through_idle_sample_and_close() {
        let mut acq = acquisition(vec![None, Some(&b"300\r"[..])], MalformedPolicy::Skip);
        assert!(matches!(acq.step(), Step::Idle));
        assert!(matches!(acq.step(), Step::Sample(Reading(300))));
        assert!(matches!(
            acq.step(),
            Step::Stop(AcquisitionError::Source(SourceError::Closed))
        ));
    }

    #[test]
    fn skip_policy_drops_bad_lines() {
        let mut acq = acquisition(vec![Some(&b"abc"[..]), Some(&b""[..])], MalformedPolicy::Skip);
        match acq.step() {
            Step::Skipped(e) => assert_eq!(e.line, "abc"),
            other => panic!("expected a skipped sample, got {:?}", other),
        }
        match acq.step() {
            Step::Skipped(e) => assert_eq!(e.reason, ParseError::Empty),
            other => panic!("expected a skipped sample, got {:?}", other),
        }
    }

    #[test]
    fn stop_policy_halts_on_bad_line() {
        let mut acq = acquisition(vec![Some(&b"1.5"[..])], MalformedPolicy::Stop);
        assert!(matches!(
            acq.step(),
            Step::Stop(AcquisitionError::Malformed(SampleError { .. }))
        ));
    }

    #[test]
    fn default_config_halts_on_non_numeric_line() {
        let policy = crate::config::VoltmeterConfig::default().malformed_policy;
        let mut acq = acquisition(vec![Some(&b"512\r"[..]), Some(&b"abc\r"[..])], policy);
        assert!(matches!(acq.step(), Step::Sample(Reading(512))));
        match acq.step() {
            Step::Stop(AcquisitionError::Malformed(e)) => {
                assert_eq!(e.line, "abc\r");
                assert!(matches!(e.reason, ParseError::NotAnInteger(_)));
            }
            other => panic!("expected a halt, got {:?}", other),
        }
    }

    #[test]
    fn default_run_stops_after_a_bad_line() {
        let acq = acquisition(
            vec![Some(&b"100"[..]), Some(&b""[..]), Some(&b"900"[..])],
            MalformedPolicy::default(),
        );
        let (tx, rx) = channel();
        acq.run(tx);
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], AcquisitionEvent::Sample(Reading(100))));
        assert!(matches!(
            events[1],
            AcquisitionEvent::Halted(AcquisitionError::Malformed(SampleError {
                reason: ParseError::Empty,
                ..
            }))
        ));
    }

    #[test]
    fn run_forwards_samples_then_reports_the_halt() {
        let acq = acquisition(
            vec![Some(&b"0"[..]), Some(&b"junk"[..]), None, Some(&b"1023"[..])],
            MalformedPolicy::Skip,
        );
        let (tx, rx) = channel();
        acq.run(tx);
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], AcquisitionEvent::Sample(Reading(0))));
        assert!(matches!(events[1], AcquisitionEvent::Sample(Reading(1023))));
        assert!(matches!(
            events[2],
            AcquisitionEvent::Halted(AcquisitionError::Source(SourceError::Closed))
        ));
    }

    #[test]
    fn run_exits_when_asked_to_stop() {
        let running = Arc::new(AtomicBool::new(false));
        let acq = Acquisition::new(
            Box::new(Canned(vec![Some(&b"1"[..])].into())),
            MalformedPolicy::Skip,
            running,
        );
        let (tx, rx) = channel();
        acq.run(tx);
        assert!(rx.try_iter().next().is_none());
    }
}
