//! Snapshots exchanged between workers
//!
//! Both feeds publish whole values; the consumer keeps only the latest one.

use std::collections::HashMap;

/// Latest known readings of every configured metering item, keyed by object path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeteringSnapshot {
    /// Production in watts, multiplier already applied
    pub producers: HashMap<String, f64>,
    /// Consumption in watts, including the station itself
    pub consumers: HashMap<String, f64>,
}

impl MeteringSnapshot {
    pub fn total_production(&self) -> f64 {
        self.producers.values().sum()
    }

    pub fn total_consumption(&self) -> f64 {
        self.consumers.values().sum()
    }
}

/// Normalized station state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChargerState {
    /// Whether the station is allowed to charge
    pub active: bool,
    /// Station's own draw in watts
    pub current_usage: f64,
    /// Amperage currently configured on the station
    pub current_amp_setting: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_every_item() {
        let snapshot = MeteringSnapshot {
            producers: HashMap::from([
                ("/Ac/Power".to_string(), 2500.0),
                ("/Pv/0/P".to_string(), 500.0),
            ]),
            consumers: HashMap::from([("/Ac/L1/Power".to_string(), 1200.5)]),
        };
        assert_eq!(snapshot.total_production(), 3000.0);
        assert_eq!(snapshot.total_consumption(), 1200.5);
        assert_eq!(MeteringSnapshot::default().total_production(), 0.0);
    }
}
