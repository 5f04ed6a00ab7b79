//! Cycle pacing and timestamp formatting.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::Instant;

/// Default absolute tolerance before an overrun is reported (5 ms).
pub const DEFAULT_OVERRUN_TOLERANCE: Duration = Duration::from_millis(5);

/// What the scheduler does after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// Finished early: sleep for the remainder of the interval.
    Sleep(Duration),
    /// Finished within tolerance of the interval: start the next cycle now.
    OnTime,
    /// Exceeded the interval by more than the tolerance.
    Overrun(Duration),
}

/// Timing of one capture cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTiming {
    pub started: Instant,
    pub elapsed: Duration,
    pub interval: Duration,
    pub tolerance: Duration,
}

impl CycleTiming {
    /// Measure a cycle that began at `started`, ending now.
    pub fn measure(started: Instant, interval: Duration, tolerance: Duration) -> Self {
        Self {
            started,
            elapsed: started.elapsed(),
            interval,
            tolerance,
        }
    }

    /// Decide whether to sleep, continue, or report an overrun.
    pub fn pace(&self) -> Pace {
        if self.elapsed < self.interval {
            Pace::Sleep(self.interval - self.elapsed)
        } else if self.elapsed > self.interval + self.tolerance {
            Pace::Overrun(self.elapsed - self.interval)
        } else {
            Pace::OnTime
        }
    }
}

/// How capture timestamps are written to the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampFormat {
    /// Seconds since the Unix epoch, e.g. `1717236000`.
    Unix,
    /// Local time, e.g. `2024-06-01 10:00:00`.
    #[default]
    Iso,
}

impl TimestampFormat {
    pub fn stamp(&self, now: DateTime<Local>) -> String {
        match self {
            TimestampFormat::Unix => now.timestamp().to_string(),
            TimestampFormat::Iso => now.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    pub fn stamp_now(&self) -> String {
        self.stamp(Local::now())
    }
}

impl FromStr for TimestampFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unix" | "timestamp" => Ok(TimestampFormat::Unix),
            "iso" => Ok(TimestampFormat::Iso),
            other => Err(format!("unknown timestamp format '{}' (expected unix or iso)", other)),
        }
    }
}

impl fmt::Display for TimestampFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampFormat::Unix => write!(f, "unix"),
            TimestampFormat::Iso => write!(f, "iso"),
        }
    }
}
