
//! # AMQP Worker
//! A framework for building long-running AMQP queue consumers.
//!
//! A worker declares its topology (exchange, queue, binding), connects, and
//! consumes until the broker ends the stream, dispatching each message to
//! the [`Worker`] extension points while timing the work, logging outcomes,
//! and isolating per-message failures so one bad message never stops the
//! process.
//!
//! ```no_run
//! use amqp_worker::{
//!     InboundMessage, SinkRegistry, TableSource, Worker, WorkerError, WorkerRunner,
//! };
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct OrderWorker;
//!
//! #[async_trait]
//! impl Worker for OrderWorker {
//!     fn name(&self) -> &str {
//!         "orders"
//!     }
//!
//!     async fn handle(&self, message: &InboundMessage) -> Result<(), WorkerError> {
//!         println!("order: {}", message.payload());
//!         Ok(())
//!     }
//!
//!     async fn on_fail(&self, _message: &InboundMessage, fault: &WorkerError) {
//!         eprintln!("order failed: {}", fault);
//!     }
//! }
//!
//! # async fn run() -> Result<(), WorkerError> {
//! let source = TableSource::new()
//!     .set_shared("host", "localhost")
//!     .set_shared("port", "5672")
//!     .set_shared("vhost", "/")
//!     .set_shared("user", "guest")
//!     .set_shared("password", "guest")
//!     .set("orders", "exchange", "orders")
//!     .set("orders", "queue", "orders.process")
//!     .set("orders", "routing_key", "orders.created")
//!     .set("orders", "no_ack", "false");
//!
//! let mut runner =
//!     WorkerRunner::from_source(Arc::new(OrderWorker), &source, &SinkRegistry::default())?;
//! runner.run().await
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod message;
pub mod shutdown;
pub mod timing;
pub mod topology;
pub mod worker;

// Re-export key components for easy access
pub use config::{
    ConfigSource, ConnectionSettings, EnvSource, TableSource, WorkerIdentity, WorkerSettings,
};
pub use error::WorkerError;
pub use logging::{
    LogLevel, LogRecord, LogSink, Logger, MemorySink, SinkRegistry, StdLogSink,
    DEFAULT_LOG_CHANNEL, DEFAULT_LOG_DRIVER,
};
pub use message::InboundMessage;
pub use shutdown::ShutdownReport;
pub use timing::{format_duration, ProcessingTimer};
pub use topology::Topology;
pub use worker::{RunState, Worker, WorkerRunner};
