
//! The leveled logging facade used by every component of the framework.
//!
//! The core never formats log output itself: it hands a message string and a
//! structured context value to a [`LogSink`]. Sinks are looked up once at
//! configuration time from a [`SinkRegistry`] keyed by driver name; the
//! default driver forwards onto the [`log`] crate, so any `log`-compatible
//! backend (`env_logger`, `syslog`, ...) installed by the embedding
//! application receives the output.

use crate::error::WorkerError;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// The log channel used when a worker does not override
/// [`Worker::log_channel`](crate::worker::Worker::log_channel).
pub const DEFAULT_LOG_CHANNEL: &str = "stack";

/// The driver used when the configuration does not name one.
pub const DEFAULT_LOG_DRIVER: &str = "log";

/// Syslog-style severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Notice => "notice",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
            LogLevel::Alert => "alert",
            LogLevel::Emergency => "emergency",
        }
    }

    // The `log` crate has five levels; the upper syslog severities all land
    // on `Error` and `Notice` lands on `Info`.
    fn to_log_level(self) -> log::Level {
        match self {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info | LogLevel::Notice => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error | LogLevel::Critical | LogLevel::Alert | LogLevel::Emergency => {
                log::Level::Error
            }
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete writer behind the logging facade.
pub trait LogSink: Send + Sync {
    fn write(&self, level: LogLevel, channel: &str, message: &str, context: &Value);
}

/// A named logging channel bound to a resolved sink.
#[derive(Clone)]
pub struct Logger {
    channel: String,
    sink: Arc<dyn LogSink>,
}

impl Logger {
    pub fn new(channel: impl Into<String>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            channel: channel.into(),
            sink,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn log(&self, level: LogLevel, message: &str, context: Value) {
        self.sink.write(level, &self.channel, message, &context);
    }

    pub fn debug(&self, message: &str, context: Value) {
        self.log(LogLevel::Debug, message, context);
    }

    pub fn info(&self, message: &str, context: Value) {
        self.log(LogLevel::Info, message, context);
    }

    pub fn notice(&self, message: &str, context: Value) {
        self.log(LogLevel::Notice, message, context);
    }

    pub fn warning(&self, message: &str, context: Value) {
        self.log(LogLevel::Warning, message, context);
    }

    pub fn error(&self, message: &str, context: Value) {
        self.log(LogLevel::Error, message, context);
    }

    pub fn critical(&self, message: &str, context: Value) {
        self.log(LogLevel::Critical, message, context);
    }

    pub fn alert(&self, message: &str, context: Value) {
        self.log(LogLevel::Alert, message, context);
    }

    pub fn emergency(&self, message: &str, context: Value) {
        self.log(LogLevel::Emergency, message, context);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// Maps driver names to sink constructors, resolved once at configuration
/// time. The default registry ships the `"log"` driver.
pub struct SinkRegistry {
    factories: HashMap<String, Box<dyn Fn() -> Arc<dyn LogSink> + Send + Sync>>,
}

impl SinkRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers a driver under `name`, replacing any previous registration.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn LogSink> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn resolve(&self, driver: &str) -> Result<Arc<dyn LogSink>, WorkerError> {
        self.factories
            .get(driver)
            .map(|factory| factory())
            .ok_or_else(|| WorkerError::UnknownLogDriver(driver.to_string()))
    }

    /// Builds a [`Logger`] for `channel` backed by the named driver.
    pub fn logger(&self, channel: &str, driver: &str) -> Result<Logger, WorkerError> {
        Ok(Logger::new(channel, self.resolve(driver)?))
    }
}

impl Default for SinkRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_LOG_DRIVER, || Arc::new(StdLogSink));
        registry
    }
}

/// Forwards records onto the [`log`] crate, using the channel as the target.
pub struct StdLogSink;

impl LogSink for StdLogSink {
    fn write(&self, level: LogLevel, channel: &str, message: &str, context: &Value) {
        let level = level.to_log_level();
        if context.is_null() || context.as_object().is_some_and(|map| map.is_empty()) {
            log::log!(target: channel, level, "{}", message);
        } else {
            log::log!(target: channel, level, "{} {}", message, context);
        }
    }
}

/// A captured log record, as stored by [`MemorySink`].
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: LogLevel,
    pub channel: String,
    pub message: String,
    pub context: Value,
}

/// Collects records in memory for assertions in tests.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// True when any captured message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|record| record.message.contains(needle))
    }

    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|record| record.level == level)
            .map(|record| record.message)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn write(&self, level: LogLevel, channel: &str, message: &str, context: &Value) {
        if let Ok(mut records) = self.records.lock() {
            records.push(LogRecord {
                level,
                channel: channel.to_string(),
                message: message.to_string(),
                context: context.clone(),
            });
        }
    }
}
