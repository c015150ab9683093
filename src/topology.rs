
//! Idempotent declaration of the exchange, queue, and binding.

use crate::error::WorkerError;
use crate::logging::Logger;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, ExchangeKind};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// The exchange/queue/binding triple a worker consumes through.
///
/// The operational parameters are fixed: a direct exchange, durable entities,
/// no auto-delete, no exclusivity. Workers must survive broker restarts and
/// must not vanish when the declaring connection drops. Redeclaring with
/// identical parameters is a broker-side no-op; a conflicting redeclaration
/// is a startup-fatal error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

impl Topology {
    /// `exchange --> routing_key --> queue`, as logged after binding.
    pub fn route_description(&self) -> String {
        format!(
            "{} --> {} --> {}",
            self.exchange, self.routing_key, self.queue
        )
    }

    /// Declares the exchange, the queue, and the binding, in that order.
    ///
    /// No partial success: the first failing step aborts startup.
    pub async fn declare(&self, channel: &Channel, logger: &Logger) -> Result<(), WorkerError> {
        channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_declare(
                &self.queue,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_bind(
                &self.queue,
                &self.exchange,
                &self.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        logger.info(
            &format!("listening on {}", self.route_description()),
            json!({ "queue": self.queue }),
        );
        Ok(())
    }
}
