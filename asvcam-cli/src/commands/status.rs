//! Status command - report camera storage and the current position.

use std::sync::Arc;

use asvcam::camera::CameraClient;
use asvcam::position::PositionProvider;
use futures::future::join_all;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the status command.
pub fn run(runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("status");
    let config = runner.config();
    let http = runner.http_client()?;

    let cameras: Vec<CameraClient> = config
        .enabled_cameras()
        .map(|c| CameraClient::new(c.device(), Arc::clone(&http), c.timeout))
        .collect();
    let position = config
        .position
        .enabled
        .then(|| PositionProvider::new(config.position.address.clone(), config.position.timeout));

    let runtime = runner.runtime()?;
    let (statuses, fix) = runtime.block_on(async {
        let statuses = join_all(cameras.iter().map(|c| c.storage_status()));
        let fix = async {
            match &position {
                Some(provider) => Some(provider.get_position().await),
                None => None,
            }
        };
        tokio::join!(statuses, fix)
    });

    println!("Cameras");
    println!("=======");
    for (camera, status) in cameras.iter().zip(statuses) {
        match status {
            Some(status) => {
                let free = gigabytes(status.sd_gb_free);
                let total = gigabytes(status.sd_gb_total);
                println!("  {:<8} online   storage {} free of {}", camera.name(), free, total);
                if let Some(sats) = status.gps_used_sats {
                    println!("  {:<8}          GPS satellites in use: {}", "", sats);
                }
            }
            None => println!("  {:<8} unreachable ({})", camera.name(), camera.device().base_url()),
        }
    }
    println!();

    println!("Position");
    println!("========");
    match fix {
        Some(position) if position.is_sentinel() => {
            println!("  {} no fix", config.position.address)
        }
        Some(position) => println!("  {} {}", config.position.address, position),
        None => println!("  disabled"),
    }

    Ok(())
}

fn gigabytes(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2} GB", v))
        .unwrap_or_else(|| "?".to_string())
}
