use crate::protocol::parse_exposure_count;
use chrono::{DateTime, Local};
use serde::Serialize;

/// One exposure reported by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExposureEvent {
    pub timestamp: DateTime<Local>,
    pub count: u64,
}

/// Turns repeated exposure-count reports into exposure events.
///
/// The device answers every poll with its running count, so the same count
/// arrives many times. Only a change produces an event. The first report
/// after `reset` is the baseline the run starts from and produces none.
#[derive(Debug, Clone)]
pub struct ExposureTracker {
    prefix: String,
    last_count: Option<u64>,
}

impl ExposureTracker {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            last_count: None,
        }
    }

    pub fn reset(&mut self) {
        self.last_count = None;
    }

    pub fn last_count(&self) -> Option<u64> {
        self.last_count
    }

    /// Feed a decoded line received at `now`.
    pub fn observe_line(&mut self, line: &str, now: DateTime<Local>) -> Option<ExposureEvent> {
        let count = parse_exposure_count(line, &self.prefix)?;
        self.observe_count(count, now)
    }

    pub fn observe_count(&mut self, count: u64, now: DateTime<Local>) -> Option<ExposureEvent> {
        match self.last_count.replace(count) {
            None => {
                log::debug!("Exposure count baseline: {}", count);
                None
            }
            Some(previous) if previous == count => None,
            Some(previous) => {
                if count < previous {
                    log::warn!("Exposure count went backwards: {} -> {}", previous, count);
                }
                Some(ExposureEvent {
                    timestamp: now,
                    count,
                })
            }
        }
    }
}
