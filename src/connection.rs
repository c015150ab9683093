
//! Broker connection establishment and teardown.

use crate::config::{ConnectionSettings, WorkerIdentity};
use crate::error::WorkerError;
use crate::logging::Logger;
use lapin::{Channel, Connection, ConnectionProperties};
use serde_json::json;

/// Opens the connection and its single channel.
///
/// The connection is tagged with `"{alias}-{environment}"` so the broker's
/// management UI can tell worker processes apart. Fail-fast: any connect or
/// channel-open failure propagates unchanged and the process is expected to
/// be restarted by an external supervisor.
pub async fn open(
    identity: &WorkerIdentity,
    settings: &ConnectionSettings,
    logger: &Logger,
) -> Result<(Connection, Channel), WorkerError> {
    let properties =
        ConnectionProperties::default().with_connection_name(identity.connection_name().into());

    let connection = Connection::connect(&settings.uri(), properties).await?;
    logger.info(
        &format!("connected to {}", settings.redacted_uri()),
        json!({
            "worker": identity.name(),
            "connection_name": identity.connection_name(),
        }),
    );

    let channel = match connection.create_channel().await {
        Ok(channel) => channel,
        Err(error) => {
            logger.error(
                &format!("failed to open channel: {}", error),
                json!({ "worker": identity.name() }),
            );
            return Err(error.into());
        }
    };

    Ok((connection, channel))
}

/// Closes the channel, then the connection.
///
/// Close failures are logged at warning level and otherwise ignored; the
/// process is on its way out and has nothing better to do with them.
pub async fn close(channel: Channel, connection: Connection, logger: &Logger) {
    if let Err(error) = channel.close(200, "worker stopped").await {
        logger.warning(&format!("channel close failed: {}", error), json!({}));
    }
    if let Err(error) = connection.close(200, "worker stopped").await {
        logger.warning(&format!("connection close failed: {}", error), json!({}));
    }
}
