//! Synchronized multi-camera capture scheduler.
//!
//! # State Machine
//!
//! ```text
//! Idle ──► Capturing ──► Fusing ──► Recording ──► Sleeping ──► Idle ...
//!   └──────────┴────────────┴──────────┴────────────┴──► Aborted (cancellation)
//! ```
//!
//! # Cycle
//!
//! 1. Spawn one capture task per camera (all initiated before any is awaited)
//! 2. Query the position concurrently and join both
//! 3. Stamp, fuse and record every capture that produced paths
//! 4. Sleep the rest of the interval, or warn on overrun
//!
//! Failure isolation is per device: a camera that times out is logged as
//! skipped and never prevents recording the others. A recorder failure ends
//! the cycle's recording step but not the loop; only cancellation does.

mod timing;

pub use timing::{CycleTiming, Pace, TimestampFormat, DEFAULT_OVERRUN_TOLERANCE};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::camera::{CameraClient, CaptureResult};
use crate::position::{Position, PositionSource};
use crate::recorder::{CaptureEvent, EventRecorder, RecorderError};
use crate::telemetry::{CapturePoint, NullSink, TelemetrySink};

/// Default capture interval.
pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_secs(5);

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Capturing,
    Fusing,
    Recording,
    Sleeping,
    Aborted,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Capturing => "capturing",
            SchedulerState::Fusing => "fusing",
            SchedulerState::Recording => "recording",
            SchedulerState::Sleeping => "sleeping",
            SchedulerState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Target time between cycle starts.
    pub interval: Duration,
    /// Overshoot tolerated before an overrun warning.
    pub overrun_tolerance: Duration,
    /// Timestamp format for the event log.
    pub timestamp_format: TimestampFormat,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CAPTURE_INTERVAL,
            overrun_tolerance: DEFAULT_OVERRUN_TOLERANCE,
            timestamp_format: TimestampFormat::default(),
        }
    }
}

/// Outcome of one capture cycle.
#[derive(Debug)]
pub struct CycleReport {
    /// Devices whose capture was recorded, in camera order.
    pub recorded: Vec<String>,
    /// Devices that produced no capture.
    pub skipped: Vec<String>,
    /// Position fused into this cycle's captures.
    pub position: Position,
    /// Recorder failure that cut the recording step short.
    pub fault: Option<RecorderError>,
    pub timing: CycleTiming,
}

/// Totals returned when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerExit {
    pub cycles: u64,
    pub faults: u64,
}

/// Drives the capture loop.
pub struct CaptureScheduler {
    cameras: Vec<Arc<CameraClient>>,
    position: Option<Arc<dyn PositionSource>>,
    recorder: Arc<dyn EventRecorder>,
    telemetry: Arc<dyn TelemetrySink>,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
}

impl CaptureScheduler {
    /// Create a scheduler without position fusion or telemetry.
    pub fn new(
        cameras: Vec<Arc<CameraClient>>,
        recorder: Arc<dyn EventRecorder>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            cameras,
            position: None,
            recorder,
            telemetry: Arc::new(NullSink),
            config,
            state: Mutex::new(SchedulerState::Idle),
        }
    }

    /// Fuse positions from `source` into every capture.
    pub fn with_position(mut self, source: Arc<dyn PositionSource>) -> Self {
        self.position = Some(source);
        self
    }

    /// Forward recorded captures to `sink`.
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = sink;
        self
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn set_state(&self, state: SchedulerState) {
        let mut current = self.state.lock();
        if *current != state {
            debug!(from = %*current, to = %state, "Scheduler state change");
            *current = state;
        }
    }

    /// Run cycles until `shutdown` is cancelled.
    ///
    /// Cancellation is observed while captures are in flight and while
    /// sleeping; a cycle interrupted before its recording step records
    /// nothing. In-flight capture tasks are detached and finish on their own
    /// timeouts.
    pub async fn run(&self, shutdown: CancellationToken) -> SchedulerExit {
        let mut exit = SchedulerExit::default();
        info!(
            cameras = self.cameras.len(),
            interval_ms = self.config.interval.as_millis() as u64,
            "Capture scheduler started"
        );

        while !shutdown.is_cancelled() {
            debug!("Begin capture cycle");

            let report = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                report = self.run_cycle() => report,
            };

            exit.cycles += 1;
            if let Some(fault) = &report.fault {
                exit.faults += 1;
                error!(error = %fault, "Capture cycle failed");
            }

            debug!(elapsed_ms = report.timing.elapsed.as_millis() as u64, "Time to complete");
            match report.timing.pace() {
                Pace::Sleep(remaining) => {
                    self.set_state(SchedulerState::Sleeping);
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(remaining) => {}
                    }
                }
                Pace::OnTime => {}
                Pace::Overrun(excess) => warn!(
                    excess_ms = excess.as_millis() as u64,
                    "Processing time exceeded the capture interval, expect longer times"
                ),
            }
            self.set_state(SchedulerState::Idle);
        }

        self.set_state(SchedulerState::Aborted);
        info!(cycles = exit.cycles, faults = exit.faults, "Capture scheduler stopped");
        exit
    }

    /// Run one cycle: fan out, fuse, record.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();

        self.set_state(SchedulerState::Capturing);
        let (captures, position) = self.capture_all().await;

        self.set_state(SchedulerState::Fusing);
        let mut report = CycleReport {
            recorded: Vec::new(),
            skipped: Vec::new(),
            position: position.clone(),
            fault: None,
            timing: self.measure(started),
        };

        self.set_state(SchedulerState::Recording);
        for (name, capture) in captures {
            let Some(capture) = capture else {
                debug!(device = %name, "No capture, skipping");
                report.skipped.push(name);
                continue;
            };

            let event = CaptureEvent::new(
                capture.with_position(position.clone()),
                self.config.timestamp_format.stamp_now(),
            );
            if let Err(e) = self.recorder.record(&event) {
                report.fault = Some(e);
                break;
            }

            info!(
                device = %event.capture.source_device,
                time = %event.timestamp,
                position = %event.capture.position,
                paths = %event.capture.image_paths.join(", "),
                "Capture recorded"
            );
            if let Some(first) = event.capture.first_path() {
                self.telemetry
                    .submit(CapturePoint::new(&event.capture.source_device, first));
            }
            report.recorded.push(event.capture.source_device);
        }

        report.timing = self.measure(started);
        report
    }

    fn measure(&self, started: Instant) -> CycleTiming {
        CycleTiming::measure(started, self.config.interval, self.config.overrun_tolerance)
    }

    /// Fan out captures and the position query, then join both.
    async fn capture_all(&self) -> (Vec<(String, Option<CaptureResult>)>, Position) {
        // Spawning starts every request before any is awaited.
        let handles: Vec<_> = self
            .cameras
            .iter()
            .map(|camera| {
                let camera = Arc::clone(camera);
                tokio::spawn(async move { camera.capture().await })
            })
            .collect();

        let position = async {
            match &self.position {
                Some(source) => source.current().await,
                None => Position::sentinel(),
            }
        };

        let (results, position) = tokio::join!(join_all(handles), position);

        let captures = self
            .cameras
            .iter()
            .zip(results)
            .map(|(camera, result)| {
                let capture = result.unwrap_or_else(|e| {
                    error!(device = %camera.name(), error = %e, "Capture task failed");
                    None
                });
                (camera.name().to_string(), capture)
            })
            .collect();

        (captures, position)
    }
}
