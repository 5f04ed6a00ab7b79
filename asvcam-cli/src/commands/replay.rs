//! Replay command - download the files listed in an event log.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use asvcam::fetch::FetchClient;
use asvcam::replay::{read_event_log, replay};
use clap::Args;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the replay command.
#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Event log to replay (default: the configured capture log)
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Root of the local mirror (overrides config)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

/// Run the replay command.
pub fn run(runner: &CliRunner, args: ReplayArgs) -> Result<(), CliError> {
    runner.log_startup("replay");
    let config = runner.config();

    let events = args.events.unwrap_or_else(|| config.capture.event_log.clone());
    if !events.exists() {
        return Err(CliError::Config(format!(
            "Missing event file '{}'. Run 'asvcam capture' first.",
            events.display()
        )));
    }
    let captures = read_event_log(&events, config.capture.columns)?;

    let mut fetch_config = config.retrieval.fetch_config();
    if let Some(dir) = args.output_dir {
        fetch_config.output_dir = dir;
    }

    let http = runner.http_client()?;
    let fetchers: HashMap<String, Arc<FetchClient>> = config
        .enabled_cameras()
        .map(|c| {
            let fetch = FetchClient::new(c.device(), Arc::clone(&http), fetch_config.clone());
            (c.name.clone(), Arc::new(fetch))
        })
        .collect();

    println!("Replaying {} capture(s) from {}", captures.len(), events.display());
    println!("Local mirror: {}", fetch_config.output_dir.display());
    println!();

    let runtime = runner.runtime()?;
    let shutdown = runner.shutdown_token()?;

    let report = runtime.block_on(async {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            report = replay(&captures, &fetchers) => Some(report),
        }
    });

    match report {
        Some(report) => {
            println!(
                "{} downloaded, {} cached, {} failed, {} row(s) for unknown cameras",
                report.downloaded, report.cached, report.failed, report.unknown_device
            );
            Ok(())
        }
        None => {
            println!("Replay cancelled.");
            Ok(())
        }
    }
}
