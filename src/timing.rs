
//! Elapsed-time measurement and human-scaled duration formatting.

use std::time::Instant;

const MILLIS_PER_SECOND: u64 = 1_000;
const MILLIS_PER_MINUTE: u64 = 60_000;
const MILLIS_PER_HOUR: u64 = 3_600_000;

/// Formats a millisecond count in the largest unit that holds at least one
/// whole value: hours, then minutes, then seconds, then milliseconds.
///
/// The unit is singular when the reported value is exactly 1. Values are
/// floor-divided, so 90,000 ms reports as `"1 minute"`.
pub fn format_duration(millis: u64) -> String {
    if millis >= MILLIS_PER_HOUR {
        with_unit(millis / MILLIS_PER_HOUR, "hour")
    } else if millis >= MILLIS_PER_MINUTE {
        with_unit(millis / MILLIS_PER_MINUTE, "minute")
    } else if millis >= MILLIS_PER_SECOND {
        with_unit(millis / MILLIS_PER_SECOND, "second")
    } else {
        with_unit(millis, "millisecond")
    }
}

fn with_unit(value: u64, unit: &str) -> String {
    if value == 1 {
        format!("{} {}", value, unit)
    } else {
        format!("{} {}s", value, unit)
    }
}

/// Measures the handling time of a single message.
///
/// A fresh timer is started when a delivery arrives and read once when
/// handling completes or fails; timers are never reused across messages.
#[derive(Debug)]
pub struct ProcessingTimer {
    started: Instant,
}

impl ProcessingTimer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed_millis(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Elapsed time formatted with [`format_duration`].
    pub fn elapsed_human(&self) -> String {
        format_duration(self.elapsed_millis())
    }
}
