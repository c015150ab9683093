
//! The message wrapper handed to worker extension points.

use chrono::{DateTime, Utc};
use lapin::acker::Acker;
use lapin::message::Delivery;
use lapin::types::AMQPValue;
use serde_json::{Map, Value};

/// A single delivery, decoded and ready for handling.
///
/// The wrapper lives for exactly one handler invocation and is never
/// persisted. The payload is the JSON decode of the body when the body is
/// valid JSON, and the raw bytes as a string otherwise; decoding never fails.
#[derive(Debug)]
pub struct InboundMessage {
    payload: Value,
    headers: Map<String, Value>,
    exchange: String,
    routing_key: String,
    redelivered: bool,
    delivery_tag: u64,
    content_type: Option<String>,
    message_id: Option<String>,
    received_at: DateTime<Utc>,
    acker: Option<Acker>,
}

impl InboundMessage {
    /// Wraps a delivery for handling.
    ///
    /// `no_ack` is the consumer's acknowledgement mode: when the broker
    /// auto-acks there is no acknowledgement left to perform, so the ack
    /// handle is withheld.
    pub fn from_delivery(delivery: Delivery, no_ack: bool) -> Self {
        let payload = decode_payload(&delivery.data);
        let headers = delivery
            .properties
            .headers()
            .as_ref()
            .map(field_table_to_map)
            .unwrap_or_default();

        Self {
            payload,
            headers,
            exchange: delivery.exchange.to_string(),
            routing_key: delivery.routing_key.to_string(),
            redelivered: delivery.redelivered,
            delivery_tag: delivery.delivery_tag,
            content_type: delivery
                .properties
                .content_type()
                .as_ref()
                .map(|s| s.to_string()),
            message_id: delivery
                .properties
                .message_id()
                .as_ref()
                .map(|s| s.to_string()),
            received_at: Utc::now(),
            acker: if no_ack { None } else { Some(delivery.acker) },
        }
    }

    /// Builds a message from raw parts, without a live delivery behind it.
    ///
    /// Intended for handler tests in embedding applications.
    pub fn from_bytes(exchange: &str, routing_key: &str, body: &[u8]) -> Self {
        Self {
            payload: decode_payload(body),
            headers: Map::new(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            redelivered: false,
            delivery_tag: 0,
            content_type: None,
            message_id: None,
            received_at: Utc::now(),
            acker: None,
        }
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn headers(&self) -> &Map<String, Value> {
        &self.headers
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn redelivered(&self) -> bool {
        self.redelivered
    }

    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// The acknowledgement handle for this delivery.
    ///
    /// `None` when the consumer runs with `no_ack` or the message was built
    /// with [`InboundMessage::from_bytes`]. When manual acknowledgement is
    /// configured, calling `ack`/`nack` is the handler's responsibility; the
    /// framework never acknowledges on its own.
    pub fn acker(&self) -> Option<&Acker> {
        self.acker.as_ref()
    }
}

/// JSON decode with raw-string fallback. Never fails.
pub fn decode_payload(body: &[u8]) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn field_table_to_map(table: &lapin::types::FieldTable) -> Map<String, Value> {
    table
        .inner()
        .iter()
        .map(|(key, value)| (key.to_string(), amqp_value_to_json(value)))
        .collect()
}

// AMQP field values carry more numeric shapes than JSON; everything integral
// widens to i64 and byte arrays decode lossily.
fn amqp_value_to_json(value: &AMQPValue) -> Value {
    match value {
        AMQPValue::Boolean(b) => Value::Bool(*b),
        AMQPValue::ShortShortInt(n) => Value::from(*n),
        AMQPValue::ShortShortUInt(n) => Value::from(*n),
        AMQPValue::ShortInt(n) => Value::from(*n),
        AMQPValue::ShortUInt(n) => Value::from(*n),
        AMQPValue::LongInt(n) => Value::from(*n),
        AMQPValue::LongUInt(n) => Value::from(*n),
        AMQPValue::LongLongInt(n) => Value::from(*n),
        AMQPValue::Float(n) => Value::from(*n),
        AMQPValue::Double(n) => Value::from(*n),
        AMQPValue::DecimalValue(d) => {
            Value::from(f64::from(d.value) / 10f64.powi(i32::from(d.scale)))
        }
        AMQPValue::ShortString(s) => Value::String(s.to_string()),
        AMQPValue::LongString(s) => Value::String(s.to_string()),
        AMQPValue::FieldArray(items) => Value::Array(
            items
                .as_slice()
                .iter()
                .map(amqp_value_to_json)
                .collect(),
        ),
        AMQPValue::Timestamp(n) => Value::from(*n),
        AMQPValue::FieldTable(table) => Value::Object(field_table_to_map(table)),
        AMQPValue::ByteArray(bytes) => {
            Value::String(String::from_utf8_lossy(bytes.as_slice()).into_owned())
        }
        AMQPValue::Void => Value::Null,
    }
}
