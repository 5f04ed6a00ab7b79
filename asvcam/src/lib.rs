//! asvcam - synchronized camera capture for autonomous surface vehicles
//!
//! This library drives an array of networked multispectral cameras on a
//! fixed cadence, fuses each capture with the vehicle position, records the
//! result to an append-only event log, and later pulls the captured files
//! back off the cameras' own storage.
//!
//! # Architecture
//!
//! ```text
//! write path:
//!   CaptureScheduler ──► CameraClient (×N) ─┐
//!                    └─► PositionProvider ──┴─► EventRecorder + TelemetrySink
//!
//! retrieval path:
//!   RetrievalWalker ──► /files listing ──► FetchClient (×files per directory)
//! ```
//!
//! Both paths share the [`device::Device`] naming convention and the remote
//! path format handled by [`device::relative_remote_path`].

pub mod camera;
pub mod config;
pub mod device;
pub mod fetch;
pub mod http;
pub mod logging;
pub mod position;
pub mod recorder;
pub mod replay;
pub mod retrieval;
pub mod scheduler;
pub mod supervisor;
pub mod telemetry;

/// Crate version, reported by the CLI banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
