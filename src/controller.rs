//! Throttling decision
//!
//! Turns the latest metering snapshot and station state into the station
//! state we want. The dead band between the disable and enable thresholds
//! keeps the station from flapping when surplus hovers around one of them.

mod runtime;

pub use runtime::ControlLoop;

use crate::config::Config;
use crate::snapshot::{ChargerState, MeteringSnapshot};

/// Thresholds the decision works with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleSettings {
    pub voltage: u32,
    pub max_amp_limit: u32,
    pub min_amp_threshold: u32,
    pub disable_charging_threshold: u32,
    pub enable_charging_threshold: u32,
    pub toggle_station: bool,
}

impl ThrottleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            voltage: config.electrical_pressure,
            max_amp_limit: config.max_amp_limit,
            min_amp_threshold: config.min_amp_threshold,
            disable_charging_threshold: config.disable_charging_threshold,
            enable_charging_threshold: config.enable_charging_threshold,
            toggle_station: config.toggle_station_on_threshold,
        }
    }
}

/// Outcome of one control cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Surplus in whole watts; negative when the house draws more than we produce
    pub available_watts: f64,
    /// Surplus in amps, within `[0, max_amp_limit]`
    pub available_amps: u32,
    pub desired_active: bool,
    /// Amperage the station should be set to
    pub station_amps: u32,
    pub start: bool,
    pub stop: bool,
    /// New amperage, when it differs from the current setting
    pub set_amperage: Option<u32>,
}

pub fn decide(
    settings: &ThrottleSettings,
    metering: &MeteringSnapshot,
    charger: &ChargerState,
) -> Decision {
    let household = metering.total_consumption() - charger.current_usage;
    let available_watts = (metering.total_production() - household).floor();

    let available_amps = if available_watts <= 0.0 || settings.voltage == 0 {
        0
    } else {
        // saturating cast
        (available_watts / f64::from(settings.voltage)).floor() as u32
    }
    .min(settings.max_amp_limit);

    let desired_active = if available_amps <= settings.disable_charging_threshold {
        false
    } else if available_amps >= settings.enable_charging_threshold {
        true
    } else {
        charger.active
    };

    let station_amps = available_amps.max(settings.min_amp_threshold);

    let current_setting = if charger.current_amp_setting > 0.0 {
        charger.current_amp_setting as u32
    } else {
        0
    };

    Decision {
        available_watts,
        available_amps,
        desired_active,
        station_amps,
        start: settings.toggle_station && desired_active && !charger.active,
        stop: settings.toggle_station && !desired_active && charger.active,
        set_amperage: (station_amps != current_setting).then_some(station_amps),
    }
}
