use super::bus::{BUS_ITEM_INTERFACE, ChangeBatch, ChangeStream, PowerBus};
use super::values::owned_value_to_serde;
use crate::error::{Result, SevcError};
use crate::logging::StructuredLogger;
use std::collections::HashMap;
use std::time::Duration;
use tokio_stream::StreamExt;
use zbus::zvariant::OwnedValue;
use zbus::{Connection, MatchRule, Message, MessageStream};

const CALL_TIMEOUT: Duration = Duration::from_secs(5);

// Signals queued before the aggregator catches up; older ones are dropped
const SIGNAL_QUEUE: usize = 64;

/// [`PowerBus`] backed by the system bus
pub struct SystemPowerBus {
    conn: Connection,
    logger: StructuredLogger,
}

impl SystemPowerBus {
    pub async fn connect(logger: StructuredLogger) -> Result<Self> {
        let conn = Connection::system()
            .await
            .map_err(|e| SevcError::dbus(format!("connecting to system bus: {}", e)))?;
        logger.info("Connected to system bus");
        Ok(Self { conn, logger })
    }

    fn decode_items_changed(msg: &Message, logger: &StructuredLogger) -> Option<ChangeBatch> {
        let body: HashMap<String, HashMap<String, OwnedValue>> = match msg.body().deserialize() {
            Ok(b) => b,
            Err(e) => {
                logger.warn(&format!("Ignoring malformed ItemsChanged signal: {}", e));
                return None;
            }
        };
        let batch: ChangeBatch = body
            .into_iter()
            .filter_map(|(path, item)| item.get("Value").map(|v| (path, owned_value_to_serde(v))))
            .collect();
        (!batch.is_empty()).then_some(batch)
    }
}

#[async_trait::async_trait]
impl PowerBus for SystemPowerBus {
    async fn get_value(&self, service: &str, path: &str) -> Result<serde_json::Value> {
        let call = self.conn.call_method(
            Some(service),
            path,
            Some(BUS_ITEM_INTERFACE),
            "GetValue",
            &(),
        );
        let reply = tokio::time::timeout(CALL_TIMEOUT, call)
            .await
            .map_err(|_| SevcError::timeout(format!("GetValue on {}{} timed out", service, path)))?
            .map_err(|e| SevcError::dbus(format!("GetValue on {}{}: {}", service, path, e)))?;
        let value: OwnedValue = reply.body().deserialize()?;
        let value = owned_value_to_serde(&value);
        self.logger
            .debug(&format!("Got {} for {}{}", value, service, path));
        Ok(value)
    }

    async fn watch_items(&self) -> Result<ChangeStream> {
        let rule = MatchRule::builder()
            .msg_type(zbus::message::Type::Signal)
            .interface(BUS_ITEM_INTERFACE)?
            .member("ItemsChanged")?
            .path("/")?
            .build();
        let stream = MessageStream::for_match_rule(rule, &self.conn, Some(SIGNAL_QUEUE)).await?;
        self.logger.info("Subscribed to ItemsChanged signals");

        let logger = self.logger.clone();
        let batches = stream.filter_map(move |msg| match msg {
            Ok(msg) => Self::decode_items_changed(&msg, &logger),
            Err(e) => {
                logger.warn(&format!("Error on signal stream: {}", e));
                None
            }
        });
        Ok(Box::pin(batches))
    }

    async fn close(&self) -> Result<()> {
        self.conn.clone().close().await?;
        self.logger.info("Closed system bus connection");
        Ok(())
    }
}
