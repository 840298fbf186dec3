//! D-Bus integration for Venus OS metering
//!
//! Venus OS exposes every measurement as a `com.victronenergy.BusItem` object
//! owned by the service of the device that measures it. We read the initial
//! values with `GetValue` and then follow the `ItemsChanged` signals the
//! services emit on their root object.

mod aggregator;
mod bus;
mod system;
mod values;

pub use aggregator::MeteringAggregator;
pub use bus::{BUS_ITEM_INTERFACE, ChangeBatch, ChangeStream, PowerBus};
pub use system::SystemPowerBus;
pub use values::{owned_value_to_serde, value_as_f64};
