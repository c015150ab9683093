
//! The end-of-run report, the last line of observability before the process
//! dies.

use crate::config::WorkerIdentity;
use crate::error::WorkerError;
use crate::logging::Logger;
use crate::timing::format_duration;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Mutex;
use std::time::Instant;

/// Logs the run's outcome when dropped.
///
/// Constructed once at the start of a run and held for its whole extent, so
/// the report fires on the success path, on the startup-fatal path, and on
/// unwind alike. If a fatal error was recorded it is logged first, trimmed
/// to its message line; total uptime follows, tagged with the worker alias
/// and environment. Fires exactly once and never panics.
pub struct ShutdownReport {
    logger: Logger,
    identity: WorkerIdentity,
    started: Instant,
    started_at: DateTime<Utc>,
    fatal: Mutex<Option<String>>,
}

impl ShutdownReport {
    pub fn new(logger: Logger, identity: WorkerIdentity) -> Self {
        Self {
            logger,
            identity,
            started: Instant::now(),
            started_at: Utc::now(),
            fatal: Mutex::new(None),
        }
    }

    /// Captures the fault the run is terminating with. Only the first
    /// recorded fault is reported.
    pub fn record_fatal(&self, fault: &WorkerError) {
        if let Ok(mut slot) = self.fatal.lock() {
            if slot.is_none() {
                *slot = Some(first_line(&fault.to_string()));
            }
        }
    }

    pub fn uptime_millis(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl Drop for ShutdownReport {
    fn drop(&mut self) {
        let fatal = match self.fatal.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(message) = fatal {
            self.logger.error(
                &format!("worker terminated by fatal error: {}", message),
                json!({
                    "worker": self.identity.name(),
                    "environment": self.identity.environment(),
                }),
            );
        }

        self.logger.info(
            &format!(
                "{} uptime: {}",
                self.identity.alias(),
                format_duration(self.uptime_millis())
            ),
            json!({
                "environment": self.identity.environment(),
                "started_at": self.started_at.to_rfc3339(),
            }),
        );
    }
}

fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLevel, MemorySink};

    fn identity() -> WorkerIdentity {
        WorkerIdentity::new("orders", "order-processor", "staging")
    }

    #[test]
    fn test_reports_uptime_on_clean_drop() {
        let sink = MemorySink::new();
        let report = ShutdownReport::new(Logger::new("stack", sink.clone()), identity());
        drop(report);

        let messages = sink.messages_at(LogLevel::Info);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("order-processor uptime: "));
        assert!(sink.messages_at(LogLevel::Error).is_empty());

        let records = sink.records();
        assert_eq!(records[0].context["environment"], "staging");
    }

    #[test]
    fn test_reports_fatal_error_before_uptime() {
        let sink = MemorySink::new();
        let report = ShutdownReport::new(Logger::new("stack", sink.clone()), identity());
        report.record_fatal(&WorkerError::MissingConfig {
            worker: "orders".to_string(),
            key: "host".to_string(),
        });
        drop(report);

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, LogLevel::Error);
        assert!(records[0]
            .message
            .contains("missing required configuration key 'host'"));
        assert_eq!(records[1].level, LogLevel::Info);
        assert!(records[1].message.contains("uptime"));
    }

    #[test]
    fn test_only_first_fatal_is_kept() {
        let sink = MemorySink::new();
        let report = ShutdownReport::new(Logger::new("stack", sink.clone()), identity());
        report.record_fatal(&WorkerError::from("first"));
        report.record_fatal(&WorkerError::from("second"));
        drop(report);

        let errors = sink.messages_at(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("first"));
        assert!(!errors[0].contains("second"));
    }

    #[test]
    fn test_fatal_message_is_trimmed_to_first_line() {
        let sink = MemorySink::new();
        let report = ShutdownReport::new(Logger::new("stack", sink.clone()), identity());
        report.record_fatal(&WorkerError::from("boom\nstack frame 1\nstack frame 2"));
        drop(report);

        let errors = sink.messages_at(LogLevel::Error);
        assert!(errors[0].ends_with("boom"));
        assert!(!errors[0].contains("stack frame"));
    }

    #[test]
    fn test_uptime_formatting_uses_duration_buckets() {
        // 90,000 ms of uptime reports as one minute.
        assert_eq!(format_duration(90_000), "1 minute");
    }
}
