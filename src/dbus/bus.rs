use crate::error::Result;
use std::collections::HashMap;
use std::pin::Pin;
use tokio_stream::Stream;

pub const BUS_ITEM_INTERFACE: &str = "com.victronenergy.BusItem";

/// One `ItemsChanged` signal: object path to its new `Value`
pub type ChangeBatch = HashMap<String, serde_json::Value>;

pub type ChangeStream = Pin<Box<dyn Stream<Item = ChangeBatch> + Send>>;

/// Read access to the metering bus
#[async_trait::async_trait]
pub trait PowerBus: Send + Sync {
    /// Current value of one item
    async fn get_value(&self, service: &str, path: &str) -> Result<serde_json::Value>;

    /// Subscribe to change batches from every service on the bus
    async fn watch_items(&self) -> Result<ChangeStream>;

    /// Release the bus connection
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
