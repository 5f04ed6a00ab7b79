//! Retrieve command - download or purge files stored on the cameras.

use std::path::PathBuf;
use std::sync::Arc;

use asvcam::config::{CameraSettings, ConfigFile};
use asvcam::fetch::FetchClient;
use asvcam::retrieval::{NameFilter, RetrievalError, RetrievalMode, RetrievalWalker, WalkReport};
use clap::Args;
use futures::future::join_all;
use tracing::error;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the retrieve command.
#[derive(Debug, Args)]
pub struct RetrieveArgs {
    /// Camera to retrieve from (repeatable; default: every enabled camera)
    #[arg(long = "camera", short = 'c')]
    pub cameras: Vec<String>,

    /// Only handle paths matching this regular expression
    #[arg(long)]
    pub filter: Option<String>,

    /// Delete files on the camera instead of downloading them
    #[arg(long)]
    pub delete: bool,

    /// Root of the local mirror (overrides config)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Maximum concurrent transfers per directory (overrides config)
    #[arg(long)]
    pub max_concurrent: Option<usize>,
}

/// One camera's share of the run.
struct Job {
    walker: RetrievalWalker,
    mode: RetrievalMode,
    filter: Option<NameFilter>,
}

/// Run the retrieve command.
pub fn run(runner: &CliRunner, args: RetrieveArgs) -> Result<(), CliError> {
    runner.log_startup("retrieve");
    let config = runner.config();

    let cameras = select_cameras(config, &args.cameras)?;

    let mut retrieval = config.retrieval.clone();
    if let Some(dir) = &args.output_dir {
        retrieval.output_dir = dir.clone();
    }
    if let Some(limit) = args.max_concurrent {
        retrieval.max_concurrent = Some(limit);
    }

    let http = runner.http_client()?;
    let mut jobs = Vec::with_capacity(cameras.len());
    for camera in &cameras {
        let pattern = args.filter.clone().or_else(|| camera.filter.clone());
        let filter = pattern.as_deref().map(NameFilter::new).transpose()?;
        let mode = if args.delete { RetrievalMode::Delete } else { camera.mode };

        let fetch = Arc::new(FetchClient::new(
            camera.device(),
            Arc::clone(&http),
            retrieval.fetch_config(),
        ));
        jobs.push(Job {
            walker: RetrievalWalker::new(fetch, retrieval.walker_config()),
            mode,
            filter,
        });
    }

    for job in &jobs {
        let device = job.walker.fetch_client().device();
        let filter = job.filter.as_ref().map(|f| f.pattern()).unwrap_or("(none)");
        println!("{}: {} (filter: {})", device, job.mode, filter);
    }
    println!("Local mirror: {}", retrieval.output_dir.display());
    println!();

    let runtime = runner.runtime()?;
    let shutdown = runner.shutdown_token()?;

    let results: Option<Vec<Result<WalkReport, RetrievalError>>> = runtime.block_on(async {
        let walks = join_all(jobs.iter().map(|job| job.walker.run(job.mode, job.filter.as_ref())));
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            results = walks => Some(results),
        }
    });

    let Some(results) = results else {
        println!("Retrieval cancelled.");
        return Ok(());
    };

    let mut failures = 0;
    let mut total = WalkReport::default();
    for (job, result) in jobs.iter().zip(results) {
        let name = job.walker.fetch_client().device().name();
        match result {
            Ok(report) => {
                println!("{}: {}", name, report);
                total.merge(&report);
            }
            Err(e) => {
                error!(device = %name, error = %e, "Retrieval failed");
                println!("{}: failed: {}", name, e);
                failures += 1;
            }
        }
    }

    if jobs.len() > 1 {
        println!();
        println!("Total: {} file(s) seen; {}", total.files_seen(), total);
    }

    if failures > 0 {
        return Err(CliError::Failed(format!("{} camera(s) could not be listed", failures)));
    }
    Ok(())
}

/// Cameras named on the command line, or every enabled camera.
fn select_cameras(config: &ConfigFile, names: &[String]) -> Result<Vec<CameraSettings>, CliError> {
    if names.is_empty() {
        let cameras: Vec<_> = config.enabled_cameras().cloned().collect();
        if cameras.is_empty() {
            return Err(CliError::Config("No enabled cameras in the config file.".to_string()));
        }
        return Ok(cameras);
    }

    names
        .iter()
        .map(|name| {
            config.camera(name).cloned().ok_or_else(|| {
                CliError::Config(format!(
                    "Unknown camera '{}'. Configured cameras: {}",
                    name,
                    config.cameras.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
                ))
            })
        })
        .collect()
}
