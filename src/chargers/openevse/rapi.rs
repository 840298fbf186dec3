//! RAPI reply parsing
//!
//! Replies look like `$OK 6 32 16 16^2C`: a status token, the values and an
//! optional `^xx` checksum glued to the last token.

use crate::error::{Result, SevcError};
use serde::Deserialize;

/// EVSE states that mean charging is switched off
pub const STATE_SLEEPING: u64 = 0xFE;
pub const STATE_DISABLED: u64 = 0xFF;

/// JSON envelope returned by the WiFi gateway's `/r` endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RapiResponse {
    #[serde(default)]
    pub cmd: String,
    #[serde(default)]
    pub ret: String,
    #[serde(default)]
    pub error: String,
}

impl RapiResponse {
    /// Reject gateway errors and negative acknowledgements
    pub fn validate(&self) -> Result<()> {
        if !self.error.is_empty() {
            return Err(SevcError::protocol(format!(
                "gateway error for {}: {}",
                self.cmd, self.error
            )));
        }
        if self.ret.starts_with("$NK") {
            return Err(SevcError::protocol(format!(
                "{} rejected by station: {}",
                self.cmd, self.ret
            )));
        }
        Ok(())
    }

    /// Commands that change settings must answer `$OK`
    pub fn expect_ok(&self) -> Result<()> {
        self.validate()?;
        if !self.ret.starts_with("$OK") {
            return Err(SevcError::protocol(format!(
                "unexpected reply to {}: {:?}",
                self.cmd, self.ret
            )));
        }
        Ok(())
    }
}

/// `$GC` reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityInfo {
    pub min_amps: u32,
    pub max_amps: u32,
    pub pilot_amps: u32,
    /// Configured maximum, as saved to EEPROM
    pub current_max_amps: u32,
}

/// `$GG` reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeReading {
    pub milli_amps: u64,
    /// Zero when the station does not measure voltage
    pub milli_volts: u64,
}

/// `$GS` reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateInfo {
    pub state: u64,
    pub elapsed: u64,
    pub pilot_state: u64,
    pub vflags: u64,
}

impl StateInfo {
    pub fn is_enabled(&self) -> bool {
        is_enabled_state(self.state)
    }
}

pub fn is_enabled_state(state: u64) -> bool {
    state != STATE_SLEEPING && state != STATE_DISABLED
}

fn tokens<'a>(ret: &'a str, expected: usize, what: &str) -> Result<Vec<&'a str>> {
    let mut values: Vec<&str> = ret.split_whitespace().collect();
    if values.len() != expected {
        return Err(SevcError::protocol(format!(
            "unexpected {} reply: {:?}",
            what, ret
        )));
    }
    let last = values[expected - 1];
    values[expected - 1] = last.split('^').next().unwrap_or(last);
    Ok(values)
}

fn parse_num<T: TryFrom<u64>>(token: &str, radix_hex: bool, what: &str) -> Result<T> {
    let raw = if radix_hex {
        u64::from_str_radix(token, 16)
    } else {
        token.parse::<u64>()
    };
    raw.ok()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| SevcError::protocol(format!("parsing {}: {:?}", what, token)))
}

// Readings the firmware reports as -1 when unavailable
fn parse_reading(token: &str, what: &str) -> Result<u64> {
    token
        .parse::<i64>()
        .map(|v| v.max(0) as u64)
        .map_err(|_| SevcError::protocol(format!("parsing {}: {:?}", what, token)))
}

pub fn parse_capacity(ret: &str) -> Result<CapacityInfo> {
    let v = tokens(ret, 5, "$GC")?;
    Ok(CapacityInfo {
        min_amps: parse_num(v[1], false, "min amps")?,
        max_amps: parse_num(v[2], false, "max amps")?,
        pilot_amps: parse_num(v[3], false, "pilot amps")?,
        current_max_amps: parse_num(v[4], false, "current max amps")?,
    })
}

pub fn parse_charge(ret: &str) -> Result<ChargeReading> {
    let v = tokens(ret, 3, "$GG")?;
    Ok(ChargeReading {
        milli_amps: parse_reading(v[1], "milliamps")?,
        milli_volts: parse_reading(v[2], "millivolts")?,
    })
}

pub fn parse_state(ret: &str) -> Result<StateInfo> {
    let v = tokens(ret, 5, "$GS")?;
    Ok(StateInfo {
        state: parse_num(v[1], true, "state")?,
        elapsed: parse_num(v[2], false, "elapsed")?,
        pilot_state: parse_num(v[3], true, "pilot state")?,
        vflags: parse_num(v[4], false, "vflags")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_strips_checksum() {
        let info = parse_capacity("$OK 6 32 16 24^2C").unwrap();
        assert_eq!(
            info,
            CapacityInfo {
                min_amps: 6,
                max_amps: 32,
                pilot_amps: 16,
                current_max_amps: 24
            }
        );
        assert!(parse_capacity("$OK 6 32 16").is_err());
    }

    #[test]
    fn state_is_hex() {
        let state = parse_state("$OK fe 1234 03 0^1A").unwrap();
        assert_eq!(state.state, 0xFE);
        assert!(!state.is_enabled());
        assert!(parse_state("$OK 3 10 2 0").unwrap().is_enabled());
        assert!(!parse_state("$OK ff 0 1 0").unwrap().is_enabled());
    }

    #[test]
    fn charge_reading_tolerates_missing_voltage() {
        let reading = parse_charge("$OK 16000 -1^22").unwrap();
        assert_eq!(reading.milli_amps, 16000);
        assert_eq!(reading.milli_volts, 0);
        assert!(parse_charge("$OK abc 230000").is_err());
    }

    #[test]
    fn negative_acknowledgement_is_rejected() {
        let resp = RapiResponse {
            cmd: "$SC 40".to_string(),
            ret: "$NK^21".to_string(),
            error: String::new(),
        };
        assert!(resp.validate().is_err());

        let resp = RapiResponse {
            cmd: "$SC 16".to_string(),
            ret: String::new(),
            error: String::new(),
        };
        assert!(resp.validate().is_ok());
        assert!(resp.expect_ok().is_err());
    }
}
