// Exposure/image correlator
//
// Two independent streams arrive here: exposures reported by the controller
// and images discovered in the capture directory. After every insertion the
// pending sets are swept once, greedily, oldest exposure first; each exposure
// claims its nearest unclaimed image if that image lies within the tolerance.
// Committed pairs are appended to the run's record log and leave the pending
// sets for good. Everything else stays pending for later sweeps.

use crate::discovery::ImageEvent;
use crate::error::CorrelateError;
use crate::exposure::ExposureEvent;
use crate::record_log::{CorrelationRecord, RecordLog};
use chrono::{DateTime, Duration, Local};
use std::collections::HashSet;
use std::path::Path;

pub const DEFAULT_TOLERANCE_SECS: f64 = 2.0;

/// Images modified more than this long before the run started are backlog.
const BACKLOG_GRACE_MS: i64 = 1000;

/// Outcome of one insertion: what was committed, and which commits could not
/// be written to disk. Failed rows still count as matched.
#[derive(Debug, Default)]
pub struct MatchReport {
    pub committed: Vec<CorrelationRecord>,
    pub failures: Vec<CorrelateError>,
}

impl MatchReport {
    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.failures.is_empty()
    }
}

/// State owned by one run. Replaced wholesale by `start_run`.
#[derive(Debug)]
struct Run {
    started_at: DateTime<Local>,
    tolerance_secs: f64,
    capturing: bool,
    log: RecordLog,
    pending_exposures: Vec<ExposureEvent>,
    pending_images: Vec<ImageEvent>,
    seen_images: HashSet<String>,
    matched: usize,
}

#[derive(Debug, Default)]
pub struct Correlator {
    run: Option<Run>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new run, discarding all pending and seen state of the last one.
    ///
    /// The run is active even when `Err` is returned: the error only reports
    /// that the log header could not be written yet. It is retried on the
    /// first append.
    pub fn start_run(
        &mut self,
        now: DateTime<Local>,
        tolerance_secs: f64,
        log_dir: &Path,
    ) -> Result<(), CorrelateError> {
        let log = RecordLog::for_run(log_dir, now);
        log::info!(
            "Starting correlation run (tolerance {:.3}s), log {}",
            tolerance_secs,
            log.path().display()
        );

        let header = log.write_header();
        if let Err(e) = &header {
            log::error!("{}", e);
        }

        self.run = Some(Run {
            started_at: now,
            tolerance_secs,
            capturing: true,
            log,
            pending_exposures: Vec::new(),
            pending_images: Vec::new(),
            seen_images: HashSet::new(),
            matched: 0,
        });
        header
    }

    /// Stop capturing. Pending events are kept, not flushed or discarded.
    pub fn stop_run(&mut self) {
        if let Some(run) = self.run.as_mut() {
            if run.capturing {
                log::info!(
                    "Stopping correlation run: {} matched, {} exposures and {} images pending",
                    run.matched,
                    run.pending_exposures.len(),
                    run.pending_images.len()
                );
            }
            run.capturing = false;
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.run.as_ref().map(|r| r.capturing).unwrap_or(false)
    }

    pub fn record_exposure(&mut self, timestamp: DateTime<Local>, count: u64) -> MatchReport {
        let Some(run) = self.capturing_run() else {
            log::debug!("Exposure {} ignored, no run capturing", count);
            return MatchReport::default();
        };
        run.pending_exposures.push(ExposureEvent { timestamp, count });
        run.drain_matches()
    }

    /// Offer a discovered image. Names already seen this run are ignored, and
    /// files older than the run are remembered but never matched.
    pub fn record_image(&mut self, timestamp: DateTime<Local>, filename: &str) -> MatchReport {
        let Some(run) = self.capturing_run() else {
            return MatchReport::default();
        };
        if !run.seen_images.insert(filename.to_string()) {
            return MatchReport::default();
        }
        if timestamp < run.started_at - Duration::milliseconds(BACKLOG_GRACE_MS) {
            log::debug!("Backlog image {} skipped", filename);
            return MatchReport::default();
        }

        log::debug!("New image {}", filename);
        run.pending_images.push(ImageEvent {
            timestamp,
            filename: filename.to_string(),
        });
        run.drain_matches()
    }

    pub fn pending_exposures(&self) -> &[ExposureEvent] {
        self.run.as_ref().map(|r| r.pending_exposures.as_slice()).unwrap_or(&[])
    }

    pub fn pending_images(&self) -> &[ImageEvent] {
        self.run.as_ref().map(|r| r.pending_images.as_slice()).unwrap_or(&[])
    }

    pub fn has_seen(&self, filename: &str) -> bool {
        self.run
            .as_ref()
            .map(|r| r.seen_images.contains(filename))
            .unwrap_or(false)
    }

    /// Pairs committed during the current run.
    pub fn matched_count(&self) -> usize {
        self.run.as_ref().map(|r| r.matched).unwrap_or(0)
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.run.as_ref().map(|r| r.log.path())
    }

    fn capturing_run(&mut self) -> Option<&mut Run> {
        self.run.as_mut().filter(|r| r.capturing)
    }
}

impl Run {
    fn drain_matches(&mut self) -> MatchReport {
        let pairs = greedy_pairs(
            &self.pending_exposures,
            &self.pending_images,
            self.tolerance_secs,
        );
        if pairs.is_empty() {
            return MatchReport::default();
        }

        let records: Vec<CorrelationRecord> = pairs
            .iter()
            .map(|&(e, i)| CorrelationRecord::new(&self.pending_exposures[e], &self.pending_images[i]))
            .collect();

        let used_exposures: HashSet<usize> = pairs.iter().map(|&(e, _)| e).collect();
        let used_images: HashSet<usize> = pairs.iter().map(|&(_, i)| i).collect();
        remove_indices(&mut self.pending_exposures, &used_exposures);
        remove_indices(&mut self.pending_images, &used_images);
        self.matched += records.len();

        let mut report = MatchReport::default();
        for record in records {
            log::info!(
                "Matched exposure #{} with {} ({:+} ms)",
                record.exposure_count,
                record.image_filename,
                record.delta_ms
            );
            if let Err(e) = self.log.append(&record) {
                log::error!(
                    "Record for exposure #{} / {} not persisted: {}",
                    record.exposure_count,
                    record.image_filename,
                    e
                );
                report.failures.push(e);
            }
            report.committed.push(record);
        }
        report
    }
}

/// One greedy sweep. Returns `(exposure_index, image_index)` pairs in the
/// order the exposures were processed (oldest first).
///
/// This is not an optimal assignment: an older exposure takes its nearest
/// image even when a newer exposure would have been a closer fit.
pub fn greedy_pairs(
    exposures: &[ExposureEvent],
    images: &[ImageEvent],
    tolerance_secs: f64,
) -> Vec<(usize, usize)> {
    let mut order: Vec<usize> = (0..exposures.len()).collect();
    order.sort_by_key(|&i| exposures[i].timestamp);

    let mut claimed = vec![false; images.len()];
    let mut pairs = Vec::new();

    for e in order {
        let exposure_time = exposures[e].timestamp;
        let mut best: Option<(usize, f64)> = None;

        for (i, image) in images.iter().enumerate() {
            if claimed[i] {
                continue;
            }
            let diff = seconds_between(exposure_time, image.timestamp).abs();
            if best.map_or(true, |(_, d)| diff < d) {
                best = Some((i, diff));
            }
        }

        if let Some((i, diff)) = best {
            if diff <= tolerance_secs {
                claimed[i] = true;
                pairs.push((e, i));
            }
        }
    }

    pairs
}

fn seconds_between(a: DateTime<Local>, b: DateTime<Local>) -> f64 {
    let diff = b.signed_duration_since(a);
    match diff.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => diff.num_milliseconds() as f64 / 1000.0,
    }
}

fn remove_indices<T>(items: &mut Vec<T>, indices: &HashSet<usize>) {
    let mut index = 0;
    items.retain(|_| {
        let keep = !indices.contains(&index);
        index += 1;
        keep
    });
}
