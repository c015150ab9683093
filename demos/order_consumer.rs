use amqp_worker::{EnvSource, InboundMessage, SinkRegistry, Worker, WorkerError, WorkerRunner};
use async_trait::async_trait;
use std::sync::Arc;

// 1. Define the worker and its business logic
struct OrderWorker;

#[async_trait]
impl Worker for OrderWorker {
    fn name(&self) -> &str {
        "orders"
    }

    fn alias(&self) -> &str {
        "order-processor"
    }

    async fn handle(&self, message: &InboundMessage) -> Result<(), WorkerError> {
        let order_id = message.payload()["id"].as_i64();
        log::info!("processing order {:?}", order_id);

        if order_id.is_none() {
            return Err(WorkerError::from("order message has no id"));
        }

        // Manual acknowledgement: the consumer runs with no_ack=false, so the
        // delivery stays unacked until we confirm it here.
        if let Some(acker) = message.acker() {
            acker.ack(Default::default()).await?;
        }
        Ok(())
    }

    async fn on_fail(&self, message: &InboundMessage, fault: &WorkerError) {
        log::warn!("rejecting order after failure: {}", fault);
        if let Some(acker) = message.acker() {
            if let Err(error) = acker
                .nack(lapin::options::BasicNackOptions {
                    requeue: false,
                    ..Default::default()
                })
                .await
            {
                log::error!("nack failed: {}", error);
            }
        }
    }
}

// 2. Configure and run
//
// Expects AMQP_HOST, AMQP_PORT, AMQP_VHOST, AMQP_USER, AMQP_PASSWORD plus
// AMQP_ORDERS_EXCHANGE, AMQP_ORDERS_QUEUE, AMQP_ORDERS_ROUTING_KEY and
// AMQP_ORDERS_NO_ACK in the environment.
#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let source = EnvSource::default();
    let mut runner =
        WorkerRunner::from_source(Arc::new(OrderWorker), &source, &SinkRegistry::default())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl+C received. Shutting down.");
            Ok(())
        }
        result = runner.run() => result,
    }
}
