use crate::discovery::ImageEvent;
use crate::error::CorrelateError;
use crate::exposure::ExposureEvent;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

pub const LOG_HEADER: [&str; 5] = [
    "exposure_time",
    "exposure_count",
    "image_time",
    "image_filename",
    "delta_ms",
];

/// Millisecond-precision local timestamps in the log.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A committed exposure/image pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrelationRecord {
    pub exposure_timestamp: DateTime<Local>,
    pub exposure_count: u64,
    pub image_timestamp: DateTime<Local>,
    pub image_filename: String,
    /// Image time minus exposure time; negative when the image came first.
    pub delta_ms: i64,
}

impl CorrelationRecord {
    pub fn new(exposure: &ExposureEvent, image: &ImageEvent) -> Self {
        Self {
            exposure_timestamp: exposure.timestamp,
            exposure_count: exposure.count,
            image_timestamp: image.timestamp,
            image_filename: image.filename.clone(),
            delta_ms: delta_ms(exposure.timestamp, image.timestamp),
        }
    }
}

/// `round((image - exposure) * 1000)` with the difference in seconds.
pub fn delta_ms(exposure: DateTime<Local>, image: DateTime<Local>) -> i64 {
    let diff = image.signed_duration_since(exposure);
    match diff.num_microseconds() {
        Some(us) => (us as f64 / 1000.0).round() as i64,
        None => diff.num_milliseconds(),
    }
}

#[derive(Serialize)]
struct LogRow<'a> {
    exposure_time: String,
    exposure_count: u64,
    image_time: String,
    image_filename: &'a str,
    delta_ms: i64,
}

impl<'a> From<&'a CorrelationRecord> for LogRow<'a> {
    fn from(record: &'a CorrelationRecord) -> Self {
        Self {
            exposure_time: record.exposure_timestamp.format(TIME_FORMAT).to_string(),
            exposure_count: record.exposure_count,
            image_time: record.image_timestamp.format(TIME_FORMAT).to_string(),
            image_filename: &record.image_filename,
            delta_ms: record.delta_ms,
        }
    }
}

/// Append-only CSV log of one correlation run.
///
/// The file is reopened in append mode for every row, so existing rows are
/// never rewritten and an operator can open the file while a run is going.
#[derive(Debug, Clone)]
pub struct RecordLog {
    path: PathBuf,
}

impl RecordLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log named after the run's start time, e.g. `correlation_20240131_142501_042.csv`.
    pub fn for_run(dir: &Path, started_at: DateTime<Local>) -> Self {
        let name = format!("correlation_{}.csv", started_at.format("%Y%m%d_%H%M%S_%3f"));
        Self::new(dir.join(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file and write the header row, unless it already has content.
    pub fn write_header(&self) -> Result<(), CorrelateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.persistence(e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.persistence(e))?;
        let len = file.metadata().map_err(|e| self.persistence(e))?.len();
        if len > 0 {
            return Ok(());
        }

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(LOG_HEADER).map_err(|e| self.persistence(e))?;
        writer.flush().map_err(|e| self.persistence(e))?;
        Ok(())
    }

    /// Append one row, creating the file and its header first if either is
    /// missing.
    pub fn append(&self, record: &CorrelationRecord) -> Result<(), CorrelateError> {
        self.write_header()?;

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| self.persistence(e))?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer
            .serialize(LogRow::from(record))
            .map_err(|e| self.persistence(e))?;
        writer.flush().map_err(|e| self.persistence(e))?;
        Ok(())
    }

    fn persistence(&self, err: impl std::fmt::Display) -> CorrelateError {
        CorrelateError::Persistence {
            path: self.path.clone(),
            reason: err.to_string(),
        }
    }
}
