//! Capture command - run the synchronized capture loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use asvcam::camera::CameraClient;
use asvcam::position::{PositionProvider, PositionSource};
use asvcam::recorder::{CsvEventRecorder, EventRecorder, RecorderError};
use asvcam::scheduler::{CaptureScheduler, SchedulerExit};
use asvcam::supervisor::{supervise, SupervisorOutcome};
use asvcam::telemetry::{InfluxSink, TelemetrySink};
use clap::Args;
use tracing::info;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the capture command.
#[derive(Debug, Args)]
pub struct CaptureArgs {
    /// Seconds between capture starts (overrides config)
    #[arg(long)]
    pub interval: Option<f64>,

    /// Event log to append to (overrides config)
    #[arg(long)]
    pub event_log: Option<PathBuf>,

    /// Do not query the position service
    #[arg(long)]
    pub no_position: bool,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,
}

/// Run the capture command.
pub fn run(runner: &CliRunner, args: CaptureArgs) -> Result<(), CliError> {
    runner.log_startup("capture");
    let config = runner.config();

    let mut scheduler_config = config.capture.scheduler_config();
    if let Some(secs) = args.interval {
        scheduler_config.interval = Duration::try_from_secs_f64(secs)
            .map_err(|e| CliError::Config(format!("Invalid interval {}: {}", secs, e)))?;
    }
    let event_log = args.event_log.unwrap_or_else(|| config.capture.event_log.clone());
    let columns = config.capture.columns;

    let http = runner.http_client()?;
    let cameras: Vec<Arc<CameraClient>> = config
        .enabled_cameras()
        .map(|c| Arc::new(CameraClient::new(c.device(), Arc::clone(&http), c.timeout)))
        .collect();
    if cameras.is_empty() {
        return Err(CliError::Config(
            "No enabled cameras. Add a [camera.<name>] section to the config file.".to_string(),
        ));
    }

    // Shared across restarts so the last good fix survives a restart.
    let use_position = config.position.enabled && !args.no_position;
    let position: Option<Arc<dyn PositionSource>> = use_position.then(|| {
        Arc::new(PositionProvider::new(
            config.position.address.clone(),
            config.position.timeout,
        )) as Arc<dyn PositionSource>
    });
    let telemetry: Option<Arc<dyn TelemetrySink>> = config
        .telemetry
        .influx()
        .map(|influx| {
            Arc::new(InfluxSink::new(influx, Arc::clone(&http))) as Arc<dyn TelemetrySink>
        });

    println!("Capturing from {} camera(s)", cameras.len());
    for camera in &cameras {
        println!("  {}", camera.device());
    }
    println!("  Interval:  {:.3}s", scheduler_config.interval.as_secs_f64());
    println!("  Event log: {}", event_log.display());
    println!(
        "  Restarts:  up to {} attempt(s), {:.0}s total backoff",
        config.supervisor.max_attempts,
        config.supervisor.total_budget().as_secs_f64()
    );
    println!();
    if !args.once {
        println!("Press Ctrl+C to stop");
        println!();
    }

    let runtime = runner.runtime()?;
    let shutdown = runner.shutdown_token()?;
    let once = args.once;

    let outcome = runtime.block_on(supervise(&config.supervisor, &shutdown, |attempt| {
        let cameras = cameras.clone();
        let position = position.clone();
        let telemetry = telemetry.clone();
        let event_log = event_log.clone();
        let shutdown = shutdown.clone();

        async move {
            if attempt > 0 {
                info!(attempt, "Restarting capture session");
            }
            let recorder: Arc<dyn EventRecorder> =
                match CsvEventRecorder::open(&event_log, columns) {
                    Ok(recorder) => Arc::new(recorder),
                    Err(e) => return Err(e),
                };

            let mut scheduler = CaptureScheduler::new(cameras, recorder, scheduler_config);
            if let Some(position) = position {
                scheduler = scheduler.with_position(position);
            }
            if let Some(telemetry) = telemetry {
                scheduler = scheduler.with_telemetry(telemetry);
            }

            if once {
                let report = scheduler.run_cycle().await;
                return match report.fault {
                    Some(fault) => Err(fault),
                    None => Ok(SchedulerExit { cycles: 1, faults: 0 }),
                };
            }
            Ok::<_, RecorderError>(scheduler.run(shutdown).await)
        }
    }));

    match outcome {
        SupervisorOutcome::Completed { value, .. } => {
            println!();
            println!("Capture stopped after {} cycle(s), {} fault(s)", value.cycles, value.faults);
            Ok(())
        }
        SupervisorOutcome::Cancelled { .. } => {
            println!("Capture cancelled.");
            Ok(())
        }
        SupervisorOutcome::Exhausted { failures, last_error } => Err(CliError::Failed(format!(
            "Capture failed {} time(s), giving up: {}",
            failures, last_error
        ))),
    }
}
