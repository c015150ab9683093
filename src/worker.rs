
//! The worker contract and the consume-loop state machine.

use crate::config::{ConfigSource, WorkerIdentity, WorkerSettings};
use crate::connection;
use crate::error::WorkerError;
use crate::logging::{Logger, SinkRegistry, DEFAULT_LOG_CHANNEL};
use crate::message::InboundMessage;
use crate::shutdown::ShutdownReport;
use crate::timing::ProcessingTimer;
use async_trait::async_trait;
use futures_util::{FutureExt, StreamExt};
use lapin::options::BasicConsumeOptions;
use lapin::types::FieldTable;
use lapin::Channel;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// The extension points a concrete worker supplies.
///
/// `handle` is the business logic; `on_fail` is the failure-recovery path,
/// invoked after `handle` returns an error or panics. When the worker is
/// configured with `no_ack = false`, acknowledging (or rejecting) the
/// delivery is entirely the implementor's responsibility through
/// [`InboundMessage::acker`]; the framework never acks, nacks, or requeues
/// on its own.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Unique logical identity; keys configuration lookup and logging.
    fn name(&self) -> &str;

    /// Display name used in the broker connection tag and uptime report.
    fn alias(&self) -> &str {
        self.name()
    }

    /// The logging channel this worker writes to.
    fn log_channel(&self) -> &str {
        DEFAULT_LOG_CHANNEL
    }

    /// Processes a single message.
    async fn handle(&self, message: &InboundMessage) -> Result<(), WorkerError>;

    /// Invoked once per failed message, after the fault has been logged.
    async fn on_fail(&self, message: &InboundMessage, fault: &WorkerError);
}

/// Lifecycle states, entered strictly in order. There are no
/// back-transitions: a worker that stops (or fails to start) is done, and
/// restarting is the process supervisor's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Connected,
    TopologyDeclared,
    Consuming,
    Stopped,
}

/// Owns one connection, one channel, and the consume loop for one worker.
pub struct WorkerRunner<W: Worker> {
    worker: Arc<W>,
    settings: WorkerSettings,
    identity: WorkerIdentity,
    logger: Logger,
    state: RunState,
}

impl<W: Worker + 'static> WorkerRunner<W> {
    /// Builds a runner by loading the worker's settings from `source` and
    /// resolving its logging driver from `registry`.
    pub fn from_source(
        worker: Arc<W>,
        source: &dyn ConfigSource,
        registry: &SinkRegistry,
    ) -> Result<Self, WorkerError> {
        let settings = WorkerSettings::load(source, worker.name())?;
        let logger = registry.logger(worker.log_channel(), &settings.log_driver)?;
        Ok(Self::new(worker, settings, logger))
    }

    pub fn new(worker: Arc<W>, settings: WorkerSettings, logger: Logger) -> Self {
        let identity = WorkerIdentity::new(
            worker.name(),
            worker.alias(),
            settings.environment.clone(),
        );
        Self {
            worker,
            settings,
            identity,
            logger,
            state: RunState::Created,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    /// Connects, declares topology, and consumes until the broker ends the
    /// delivery stream.
    ///
    /// Blocks for the lifetime of the process. Startup failures (connect,
    /// channel open, topology conflict) are fatal and propagate; per-message
    /// faults never are. Whatever the outcome, the shutdown report fires
    /// exactly once with the fatal error (if any) and total uptime.
    pub async fn run(&mut self) -> Result<(), WorkerError> {
        let report = ShutdownReport::new(self.logger.clone(), self.identity.clone());
        let result = self.try_run().await;
        if let Err(fault) = &result {
            report.record_fatal(fault);
        }
        result
    }

    async fn try_run(&mut self) -> Result<(), WorkerError> {
        let (broker_connection, channel) =
            connection::open(&self.identity, &self.settings.connection, &self.logger).await?;
        self.transition(RunState::Connected);

        self.settings.topology.declare(&channel, &self.logger).await?;
        self.transition(RunState::TopologyDeclared);

        self.consume(&channel).await?;

        connection::close(channel, broker_connection, &self.logger).await;
        self.transition(RunState::Stopped);
        Ok(())
    }

    async fn consume(&mut self, channel: &Channel) -> Result<(), WorkerError> {
        let options = BasicConsumeOptions {
            no_ack: self.settings.no_ack,
            ..Default::default()
        };
        let mut consumer = channel
            .basic_consume(
                &self.settings.topology.queue,
                &self.identity.connection_name(),
                options,
                FieldTable::default(),
            )
            .await?;
        self.transition(RunState::Consuming);

        self.logger.info(
            &format!("waiting for messages on '{}'", self.settings.topology.queue),
            json!({
                "worker": self.identity.name(),
                "no_ack": self.settings.no_ack,
            }),
        );

        while let Some(delivery) = consumer.next().await {
            match delivery {
                Ok(delivery) => {
                    let message = InboundMessage::from_delivery(delivery, self.settings.no_ack);
                    self.dispatch(&message).await;
                }
                Err(error) => {
                    // Termination is final for this process instance.
                    self.logger.error(
                        &format!("delivery stream failed: {}", error),
                        json!({ "worker": self.identity.name() }),
                    );
                    break;
                }
            }
        }

        self.logger.info(
            "consumption ended",
            json!({ "worker": self.identity.name() }),
        );
        Ok(())
    }

    // Per-message protocol. Faults stay inside this boundary: an error or
    // panic from the handler is logged, routed to `on_fail`, and timed, and
    // the loop takes the next delivery.
    async fn dispatch(&self, message: &InboundMessage) {
        let timer = ProcessingTimer::start();

        self.logger.info(
            "message received",
            json!({
                "worker": self.identity.name(),
                "queue": self.settings.topology.queue,
                "payload": message.payload(),
                "headers": message.headers(),
                "received_at": message.received_at().to_rfc3339(),
            }),
        );

        let outcome = AssertUnwindSafe(self.worker.handle(message))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                self.logger.info(
                    &format!("message processed in {}", timer.elapsed_human()),
                    json!({ "worker": self.identity.name() }),
                );
            }
            Ok(Err(fault)) => self.report_fault(message, fault, &timer).await,
            Err(payload) => {
                let fault = WorkerError::HandlerPanic(panic_message(payload.as_ref()));
                self.report_fault(message, fault, &timer).await;
            }
        }
    }

    async fn report_fault(
        &self,
        message: &InboundMessage,
        fault: WorkerError,
        timer: &ProcessingTimer,
    ) {
        self.logger.error(
            &format!("message handling failed: {}", fault),
            json!({
                "worker": self.identity.name(),
                "queue": self.settings.topology.queue,
                "source": source_chain(&fault),
            }),
        );

        let hook = AssertUnwindSafe(self.worker.on_fail(message, &fault))
            .catch_unwind()
            .await;
        if let Err(payload) = hook {
            self.logger.error(
                &format!("failure hook panicked: {}", panic_message(payload.as_ref())),
                json!({ "worker": self.identity.name() }),
            );
        }

        self.logger.info(
            &format!("message failed after {}", timer.elapsed_human()),
            json!({ "worker": self.identity.name() }),
        );
    }

    fn transition(&mut self, next: RunState) {
        self.logger.debug(
            &format!("state: {:?} -> {:?}", self.state, next),
            json!({ "worker": self.identity.name() }),
        );
        self.state = next;
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn source_chain(fault: &WorkerError) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = std::error::Error::source(fault);
    while let Some(error) = current {
        chain.push(error.to_string());
        current = error.source();
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableSource;
    use crate::logging::{LogLevel, MemorySink};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingWorker {
        handled: AtomicUsize,
        failures: Mutex<Vec<String>>,
        panic_in_handle: bool,
        panic_in_on_fail: bool,
    }

    impl RecordingWorker {
        fn new() -> Self {
            Self {
                handled: AtomicUsize::new(0),
                failures: Mutex::new(Vec::new()),
                panic_in_handle: false,
                panic_in_on_fail: false,
            }
        }
    }

    #[async_trait]
    impl Worker for RecordingWorker {
        fn name(&self) -> &str {
            "orders"
        }

        async fn handle(&self, message: &InboundMessage) -> Result<(), WorkerError> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            if self.panic_in_handle {
                panic!("handler exploded");
            }
            if message.payload()["fail"] == true {
                return Err(WorkerError::from("simulated handler failure"));
            }
            Ok(())
        }

        async fn on_fail(&self, _message: &InboundMessage, fault: &WorkerError) {
            if self.panic_in_on_fail {
                panic!("hook exploded");
            }
            self.failures
                .lock()
                .expect("failure log poisoned")
                .push(fault.to_string());
        }
    }

    fn test_settings() -> WorkerSettings {
        let source = TableSource::new()
            .set_shared("host", "localhost")
            .set_shared("port", "5672")
            .set_shared("vhost", "/")
            .set_shared("user", "guest")
            .set_shared("password", "guest")
            .set("orders", "exchange", "orders")
            .set("orders", "queue", "orders.process")
            .set("orders", "routing_key", "orders.created")
            .set("orders", "no_ack", "true");
        WorkerSettings::load(&source, "orders").expect("test settings")
    }

    fn test_runner(worker: RecordingWorker) -> (WorkerRunner<RecordingWorker>, Arc<MemorySink>) {
        let sink = MemorySink::new();
        let logger = Logger::new(DEFAULT_LOG_CHANNEL, sink.clone());
        let runner = WorkerRunner::new(Arc::new(worker), test_settings(), logger);
        (runner, sink)
    }

    fn message(body: &[u8]) -> InboundMessage {
        InboundMessage::from_bytes("orders", "orders.created", body)
    }

    #[test]
    fn test_runner_starts_in_created_state() {
        let (runner, _) = test_runner(RecordingWorker::new());
        assert_eq!(runner.state(), RunState::Created);
        assert_eq!(runner.identity().connection_name(), "orders-production");
    }

    #[tokio::test]
    async fn test_handler_fault_does_not_abort_dispatch_of_next_message() {
        let (runner, sink) = test_runner(RecordingWorker::new());

        runner.dispatch(&message(b"{\"fail\":true}")).await;
        runner.dispatch(&message(b"{\"fail\":false}")).await;

        let worker = &runner.worker;
        assert_eq!(worker.handled.load(Ordering::SeqCst), 2);
        let failures = worker.failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("simulated handler failure"));

        assert!(sink.contains("message handling failed"));
        assert!(sink.contains("message failed after"));
        assert!(sink.contains("message processed in"));
    }

    #[tokio::test]
    async fn test_handler_panic_is_isolated_and_routed_to_on_fail() {
        let (runner, sink) = test_runner(RecordingWorker {
            panic_in_handle: true,
            ..RecordingWorker::new()
        });

        runner.dispatch(&message(b"{}")).await;

        let failures = runner.worker.failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("handler exploded"));
        assert!(sink.contains("message handling failed: message handler panicked"));
    }

    #[tokio::test]
    async fn test_panicking_failure_hook_does_not_abort_dispatch() {
        let (runner, sink) = test_runner(RecordingWorker {
            panic_in_on_fail: true,
            ..RecordingWorker::new()
        });

        runner.dispatch(&message(b"{\"fail\":true}")).await;
        runner.dispatch(&message(b"{\"fail\":false}")).await;

        assert_eq!(runner.worker.handled.load(Ordering::SeqCst), 2);
        assert!(sink.contains("failure hook panicked"));
    }

    #[tokio::test]
    async fn test_dispatch_logs_decoded_payload_and_headers() {
        let (runner, sink) = test_runner(RecordingWorker::new());

        runner.dispatch(&message(b"{\"a\":1}")).await;

        let received = sink
            .records()
            .into_iter()
            .find(|record| record.message == "message received")
            .expect("receive event logged");
        assert_eq!(received.level, LogLevel::Info);
        assert_eq!(received.context["payload"]["a"], 1);
        assert!(received.context["headers"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_from_source_resolves_logger_channel_and_driver() {
        let sink = MemorySink::new();
        let captured = sink.clone();
        let mut registry = SinkRegistry::default();
        registry.register("memory", move || captured.clone());

        let source = TableSource::new()
            .set_shared("host", "localhost")
            .set_shared("port", "5672")
            .set_shared("vhost", "/")
            .set_shared("user", "guest")
            .set_shared("password", "guest")
            .set_shared("log_driver", "memory")
            .set("orders", "exchange", "orders")
            .set("orders", "queue", "orders.process")
            .set("orders", "routing_key", "orders.created")
            .set("orders", "no_ack", "true");

        let runner =
            WorkerRunner::from_source(Arc::new(RecordingWorker::new()), &source, &registry)
                .expect("runner builds");
        runner.logger.info("hello from worker", serde_json::Value::Null);
        assert!(sink.contains("hello from worker"));
        assert_eq!(runner.logger.channel(), DEFAULT_LOG_CHANNEL);
    }

    #[test]
    fn test_missing_required_key_fails_construction() {
        let source = TableSource::new().set_shared("host", "localhost");
        let result = WorkerRunner::from_source(
            Arc::new(RecordingWorker::new()),
            &source,
            &SinkRegistry::default(),
        );
        assert!(matches!(result, Err(WorkerError::MissingConfig { .. })));
    }
}
