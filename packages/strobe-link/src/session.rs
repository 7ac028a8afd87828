// Session - the single control loop
//
// The session owns the transport, the correlator and the exposure tracker.
// One `tokio::select!` loop multiplexes:
// - transport events (decoded lines, disconnect)
// - the exposure-count poll timer
// - the image directory scan timer
// - the caller's stop future (Ctrl-C, duration)
//
// Nothing else mutates session state, so no locks are needed around the
// pending sets or the record log. Everything worth showing an operator is
// reported through the event callback.

use crate::config::LinkConfig;
use crate::correlator::{Correlator, MatchReport};
use crate::discovery::{scan_directory, ImagePattern};
use crate::error::Result;
use crate::exposure::{ExposureEvent, ExposureTracker};
use crate::protocol::{rs485_payload, Command};
use crate::record_log::CorrelationRecord;
use crate::transport::{LineTransport, TransportEvent};
use chrono::Local;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Events reported to the session's observer
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum SessionEvent {
    Connected {
        peer: String,
    },
    Sent {
        text: String,
    },
    Line(String),
    /// Payload of an RS-485 tagged line
    Rs485(String),
    Exposure(ExposureEvent),
    Matched(CorrelationRecord),
    RunStarted {
        log_path: Option<PathBuf>,
    },
    RunStopped {
        matched: usize,
        pending_exposures: usize,
        pending_images: usize,
    },
    Disconnected {
        reason: Option<String>,
    },
    Error(String),
}

/// Why `Session::run` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    Requested,
    Disconnected,
}

type EventCallback = Box<dyn Fn(SessionEvent) + Send + Sync>;

pub struct Session {
    config: LinkConfig,
    pattern: ImagePattern,
    transport: LineTransport,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    correlator: Correlator,
    exposures: ExposureTracker,
    last_scan_error: Option<String>,
    event_callback: Option<EventCallback>,
}

impl Session {
    pub fn new(config: LinkConfig) -> Result<Self> {
        config.validate()?;
        let pattern = config.pattern()?;
        let transport = LineTransport::new().with_connect_timeout(config.connect_timeout());
        let exposures = ExposureTracker::new(config.exposure_prefix.clone());

        Ok(Self {
            config,
            pattern,
            transport,
            events: None,
            correlator: Correlator::new(),
            exposures,
            last_scan_error: None,
            event_callback: None,
        })
    }

    /// Set event callback function
    pub fn set_event_callback<F>(&mut self, callback: F)
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(Box::new(callback));
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(callback) = self.event_callback.as_ref() {
            callback(event);
        }
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub async fn connect(&mut self) -> Result<()> {
        let events = self
            .transport
            .connect(&self.config.host, self.config.port)
            .await?;
        self.events = Some(events);
        self.emit(SessionEvent::Connected {
            peer: format!("{}:{}", self.config.host, self.config.port),
        });
        Ok(())
    }

    /// Send exact operator text.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        self.transport.send(text).await?;
        self.emit(SessionEvent::Sent {
            text: text.to_string(),
        });
        Ok(())
    }

    pub async fn send_command(&mut self, command: &Command) -> Result<()> {
        self.send(&command.to_wire()).await
    }

    pub fn close(&mut self) {
        self.transport.close();
    }

    /// Reset correlation state and begin capturing.
    pub fn start_run(&mut self) {
        self.exposures.reset();
        self.last_scan_error = None;
        if let Err(e) = self.correlator.start_run(
            Local::now(),
            self.config.tolerance_secs,
            &self.config.log_dir,
        ) {
            self.emit(SessionEvent::Error(e.to_string()));
        }
        self.emit(SessionEvent::RunStarted {
            log_path: self.correlator.log_path().map(|p| p.to_path_buf()),
        });
    }

    pub fn stop_run(&mut self) {
        if !self.correlator.is_capturing() {
            return;
        }
        self.correlator.stop_run();
        self.emit(SessionEvent::RunStopped {
            matched: self.correlator.matched_count(),
            pending_exposures: self.correlator.pending_exposures().len(),
            pending_images: self.correlator.pending_images().len(),
        });
    }

    /// Dispatch one transport event. Returns false once the connection is gone.
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Line(line) => {
                let exposure = self.exposures.observe_line(&line, Local::now());
                let payload = rs485_payload(&line).map(str::to_string);
                self.emit(SessionEvent::Line(line));
                if let Some(payload) = payload {
                    self.emit(SessionEvent::Rs485(payload));
                }

                if let Some(exposure) = exposure {
                    if self.correlator.is_capturing() {
                        self.emit(SessionEvent::Exposure(exposure.clone()));
                        let report = self
                            .correlator
                            .record_exposure(exposure.timestamp, exposure.count);
                        self.publish(report);
                    }
                }
                true
            }
            TransportEvent::Disconnected { reason } => {
                self.events = None;
                self.transport.close();
                self.emit(SessionEvent::Disconnected { reason });
                false
            }
        }
    }

    /// List the image directory once and offer every qualifying file to the
    /// correlator. The listing runs on the blocking pool.
    pub async fn scan_images(&mut self) {
        let dir = self.config.image_dir.clone();
        let pattern = self.pattern.clone();
        let listing = tokio::task::spawn_blocking(move || scan_directory(&dir, &pattern)).await;

        let images = match listing {
            Ok(Ok(images)) => images,
            Ok(Err(e)) => {
                self.report_scan_error(e.to_string());
                return;
            }
            Err(e) => {
                self.report_scan_error(format!("Directory scan task failed: {}", e));
                return;
            }
        };
        self.last_scan_error = None;

        for image in images {
            let report = self.correlator.record_image(image.timestamp, &image.filename);
            self.publish(report);
        }
    }

    // Only report a failing directory once, not on every tick.
    fn report_scan_error(&mut self, message: String) {
        if self.last_scan_error.as_deref() != Some(message.as_str()) {
            log::warn!("{}", message);
            self.emit(SessionEvent::Error(message.clone()));
            self.last_scan_error = Some(message);
        }
    }

    fn publish(&self, report: MatchReport) {
        for failure in report.failures {
            self.emit(SessionEvent::Error(failure.to_string()));
        }
        for record in report.committed {
            self.emit(SessionEvent::Matched(record));
        }
    }

    /// Run a correlation session until `stop` resolves or the connection drops.
    ///
    /// Connects first if needed, sends the configured start command, polls the
    /// exposure count and scans the image directory on their intervals. On the
    /// way out the run is stopped, the stop command sent (if still connected)
    /// and the connection closed.
    pub async fn run<F>(&mut self, stop: F) -> Result<StopReason>
    where
        F: Future<Output = ()>,
    {
        if !self.transport.is_connected() {
            self.connect().await?;
        }

        let start_command = self.config.start_command.clone();
        if !start_command.is_empty() {
            self.send(&start_command).await?;
        }
        self.start_run();

        let mut poll = interval(self.config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut scan = interval(self.config.scan_interval());
        scan.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let poll_command = Command::GetExposureCount(self.config.exposure_command.clone());

        tokio::pin!(stop);

        let reason = loop {
            tokio::select! {
                biased;

                _ = &mut stop => {
                    log::info!("Stop requested");
                    break StopReason::Requested;
                }

                // Timer arms precede transport events.
                _ = poll.tick() => {
                    if let Err(e) = self.transport.send(&poll_command.to_wire()).await {
                        self.emit(SessionEvent::Error(format!("Exposure poll failed: {}", e)));
                    }
                }

                _ = scan.tick() => {
                    self.scan_images().await;
                }

                event = next_event(&mut self.events) => {
                    match event {
                        Some(event) => {
                            if !self.handle_transport_event(event) {
                                break StopReason::Disconnected;
                            }
                        }
                        None => {
                            self.events = None;
                            break StopReason::Disconnected;
                        }
                    }
                }
            }
        };

        self.stop_run();

        let stop_command = self.config.stop_command.clone();
        if reason == StopReason::Requested && !stop_command.is_empty() && self.transport.is_connected() {
            if let Err(e) = self.send(&stop_command).await {
                self.emit(SessionEvent::Error(e.to_string()));
            }
        }
        self.close();

        Ok(reason)
    }

    /// Report incoming lines for `wait`, or until the connection drops.
    /// Used for one-shot commands where no correlation run is active.
    pub async fn listen(&mut self, wait: Duration) -> StopReason {
        let deadline = tokio::time::sleep(wait);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => return StopReason::Requested,
                event = next_event(&mut self.events) => match event {
                    Some(event) => {
                        if !self.handle_transport_event(event) {
                            return StopReason::Disconnected;
                        }
                    }
                    None => {
                        self.events = None;
                        return StopReason::Disconnected;
                    }
                },
            }
        }
    }
}

async fn next_event(events: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
