//! Best-effort vehicle position from the GPS service.
//!
//! # Protocol
//!
//! ```text
//! client                         GPS service
//!   │── TCP connect ──────────────►│
//!   │── "GPS" ────────────────────►│
//!   │◄──────── {"lat":"..","lon":".."} (single read, ≤ 64 KiB)
//!   │── close ────────────────────►│
//! ```
//!
//! A fresh connection is opened per query. Any failure, and the `("0","0")`
//! sentinel, leave the cached position untouched; the provider always
//! returns *some* position, preferring staleness over absence.

mod protocol;

pub use protocol::{parse_position, QUERY_TOKEN, RESPONSE_LIMIT};

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, warn};

use crate::http::BoxFuture;

/// Coordinate value meaning "unknown".
pub const SENTINEL_COORDINATE: &str = "0";

/// Default bound on one socket round trip.
pub const DEFAULT_POSITION_TIMEOUT: Duration = Duration::from_secs(2);

/// A pair of opaque coordinate strings.
///
/// Coordinates are not parsed as numbers here; precision and format belong
/// to the producer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    pub lat: String,
    pub lon: String,
}

impl Position {
    pub fn new(lat: impl Into<String>, lon: impl Into<String>) -> Self {
        Self {
            lat: lat.into(),
            lon: lon.into(),
        }
    }

    /// The reserved `("0","0")` pair.
    pub fn sentinel() -> Self {
        Self::new(SENTINEL_COORDINATE, SENTINEL_COORDINATE)
    }

    pub fn is_sentinel(&self) -> bool {
        self.lat == SENTINEL_COORDINATE && self.lon == SENTINEL_COORDINATE
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::sentinel()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

/// Anything the scheduler can ask for a position.
///
/// Implementations must never fail: they return the best value available.
pub trait PositionSource: Send + Sync {
    fn current(&self) -> BoxFuture<'_, Position>;
}

/// Queries the GPS service and caches the last good position.
pub struct PositionProvider {
    address: String,
    timeout: Duration,
    last: Mutex<Position>,
}

/// Why a query produced no update.
#[derive(Debug)]
enum QueryFailure {
    Connect(std::io::Error),
    Send(std::io::Error),
    Receive(std::io::Error),
    Timeout,
}

impl fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryFailure::Connect(e) => write!(f, "connect failed: {}", e),
            QueryFailure::Send(e) => write!(f, "can't send GPS request: {}", e),
            QueryFailure::Receive(e) => write!(f, "can't get GPS data: {}", e),
            QueryFailure::Timeout => write!(f, "timed out"),
        }
    }
}

impl PositionProvider {
    /// Create a provider for the service at `address` (`host:port`).
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
            last: Mutex::new(Position::sentinel()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Last known position without contacting the service.
    pub fn last_position(&self) -> Position {
        self.last.lock().clone()
    }

    /// Fetch the current position, falling back to the cached one.
    pub async fn get_position(&self) -> Position {
        debug!(address = %self.address, "Start GPS position communication");

        let raw = match tokio::time::timeout(self.timeout, self.query()).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(failure)) => {
                error!(
                    address = %self.address,
                    reason = %failure,
                    "GPS query failed, check that the GPS service is active"
                );
                return self.last_position();
            }
            Err(_) => {
                error!(
                    address = %self.address,
                    reason = %QueryFailure::Timeout,
                    "GPS query failed"
                );
                return self.last_position();
            }
        };

        let position = match parse_position(&raw) {
            Ok(position) => position,
            Err(e) => {
                error!(address = %self.address, error = %e, "Failed to parse GPS message");
                return self.last_position();
            }
        };

        self.update(position)
    }

    /// Apply the sentinel rule and return the resulting position.
    fn update(&self, position: Position) -> Position {
        let mut last = self.last.lock();
        if position.is_sentinel() {
            warn!("GPS position is missing or malformed, using the last one");
        } else {
            debug!(position = %position, "GPS position updated");
            *last = position;
        }
        last.clone()
    }

    async fn query(&self) -> Result<Vec<u8>, QueryFailure> {
        let mut stream = TcpStream::connect(&self.address)
            .await
            .map_err(QueryFailure::Connect)?;

        stream
            .write_all(QUERY_TOKEN)
            .await
            .map_err(QueryFailure::Send)?;

        let mut buf = vec![0u8; RESPONSE_LIMIT];
        let n = stream.read(&mut buf).await.map_err(QueryFailure::Receive)?;
        buf.truncate(n);

        // Best effort; the service closes its side after replying anyway.
        let _ = stream.shutdown().await;
        Ok(buf)
    }
}

impl PositionSource for PositionProvider {
    fn current(&self) -> BoxFuture<'_, Position> {
        Box::pin(self.get_position())
    }
}
