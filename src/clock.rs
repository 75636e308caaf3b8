use anyhow::{Result, anyhow};
use chrono::{Local, NaiveDateTime, TimeDelta};
use tokio::time::Instant;

/// Source of the local wall-clock instant used for eligibility.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Starts at a fixed local time and advances with tokio's clock, so a paused
/// runtime and the eligibility instant stay in step.
#[derive(Debug, Clone)]
pub struct OffsetClock {
    origin: NaiveDateTime,
    started: Instant,
}

impl OffsetClock {
    pub fn starting_at(origin: NaiveDateTime) -> Self {
        Self {
            origin,
            started: Instant::now(),
        }
    }
}

impl Clock for OffsetClock {
    fn now(&self) -> NaiveDateTime {
        let elapsed = TimeDelta::from_std(self.started.elapsed()).unwrap_or(TimeDelta::zero());
        self.origin
            .checked_add_signed(elapsed)
            .unwrap_or(self.origin)
    }
}

/// Parses a local date-time such as `2024-01-03T08:30:00` or `2024-01-03 08:30`.
pub fn parse_local_datetime(raw: &str) -> Result<NaiveDateTime> {
    let trimmed = raw.trim();
    for format in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(parsed);
        }
    }
    Err(anyhow!(
        "invalid local date-time '{raw}' (expected YYYY-MM-DDTHH:MM[:SS])"
    ))
}
