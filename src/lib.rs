//! # sevc - solar surplus EV charging for Victron Venus OS
//!
//! Throttles an EV charging station so that it draws only the power the
//! installation produces beyond what the household consumes.
//!
//! ## Architecture
//!
//! - `dbus`: reads producer and consumer power from the Venus OS D-Bus
//! - `chargers`: station protocols and the connectivity manager
//! - `controller`: the throttling decision and the loop applying it
//! - `worker`: task lifecycle shared by the three workers
//! - `app`: wiring of the workers under one cancellation token
//! - `config`: configuration management and validation
//! - `logging`: structured logging and tracing

pub mod app;
pub mod chargers;
pub mod config;
pub mod controller;
pub mod dbus;
pub mod error;
pub mod logging;
pub mod snapshot;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, SevcError};
pub use snapshot::{ChargerState, MeteringSnapshot};
