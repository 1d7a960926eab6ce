use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Serial number of one ODrive controller, shared by both of its axes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SerialNumber(u64);

impl SerialNumber {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Join the two 32-bit halves a serial number is often written as.
    pub const fn from_parts(high: u32, low: u32) -> Self {
        Self(((high as u64) << 32) | low as u64)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn parts(&self) -> (u32, u32) {
        ((self.0 >> 32) as u32, self.0 as u32)
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{raw:012X}", raw = self.0)
    }
}

/// Error returned when a serial number string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParseSerialError(pub &'static str);

impl FromStr for SerialNumber {
    type Err = ParseSerialError;

    /// Accepts the hex form ODrive reports (`20873597524B`, optional `0x`) or the
    /// two-part form `HIGH:LOW` where each half is a hex word of at most 32 bits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if let Some((hi, lo)) = t.split_once(':') {
            let high = parse_hex_u32(hi)?;
            let low = parse_hex_u32(lo)?;
            return Ok(Self::from_parts(high, low));
        }
        let hex = strip_hex_prefix(t);
        if hex.is_empty() {
            return Err(ParseSerialError("empty serial number"));
        }
        u64::from_str_radix(hex, 16)
            .map(Self)
            .map_err(|_| ParseSerialError("serial number is not a 64-bit hex value"))
    }
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

fn parse_hex_u32(s: &str) -> Result<u32, ParseSerialError> {
    let hex = strip_hex_prefix(s.trim());
    if hex.is_empty() {
        return Err(ParseSerialError("empty serial number part"));
    }
    u32::from_str_radix(hex, 16)
        .map_err(|_| ParseSerialError("serial number part is not a 32-bit hex value"))
}

/// Opaque handle to a connection opened by a gateway.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct DeviceHandle(pub usize);

/// Axis states the bridge requests. Values match the firmware's `AxisState` enum.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AxisState {
    Idle,
    ClosedLoopControl,
}

impl AxisState {
    pub fn code(self) -> u32 {
        match self {
            AxisState::Idle => 1,
            AxisState::ClosedLoopControl => 8,
        }
    }
}

/// Setpoint sent to one axis, in device units (turns, turns/s, amperes).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AxisCommand {
    Position(f32),
    Velocity(f32),
    Current(f32),
}

impl AxisCommand {
    pub fn value(&self) -> f32 {
        match *self {
            AxisCommand::Position(v) | AxisCommand::Velocity(v) | AxisCommand::Current(v) => v,
        }
    }
}

/// One telemetry sample for an axis, in device units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Telemetry {
    /// Position estimate in turns.
    pub position: f32,
    /// Velocity estimate in turns/s.
    pub velocity: f32,
    /// Measured motor current in amperes, when the backend reads it.
    pub current: Option<f32>,
    pub bus_voltage: f32,
    pub axis_error: u32,
    pub motor_error: u64,
    pub encoder_error: u32,
    pub controller_error: u32,
    pub fet_temperature: f32,
    pub motor_temperature: f32,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            position: 0.0,
            velocity: 0.0,
            current: None,
            bus_voltage: 0.0,
            axis_error: 0,
            motor_error: 0,
            encoder_error: 0,
            controller_error: 0,
            fet_temperature: 0.0,
            motor_temperature: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub serial: SerialNumber,
    pub driver: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_serial() {
        let s: SerialNumber = "20873597524B".parse().unwrap();
        assert_eq!(s.raw(), 0x2087_3597_524B);
        let p: SerialNumber = "0x20873597524b".parse().unwrap();
        assert_eq!(s, p);
        assert_eq!(s.to_string(), "20873597524B");
    }

    #[test]
    fn test_parse_two_part_serial() {
        let s: SerialNumber = "2087:3597524B".parse().unwrap();
        assert_eq!(s, SerialNumber::new(0x2087_3597_524B));
        assert_eq!(s.parts(), (0x2087, 0x3597_524B));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<SerialNumber>().is_err());
        assert!("xyz".parse::<SerialNumber>().is_err());
        assert!("1:".parse::<SerialNumber>().is_err());
        assert!("1:123456789".parse::<SerialNumber>().is_err());
    }

    #[test]
    fn test_parse_error_is_std_error() {
        let err = "xyz".parse::<SerialNumber>().unwrap_err();
        assert_eq!(err.to_string(), "serial number is not a 64-bit hex value");
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn test_command_value() {
        assert_eq!(AxisCommand::Position(1.5).value(), 1.5);
        assert_eq!(AxisCommand::Velocity(-2.0).value(), -2.0);
        assert_eq!(AxisCommand::Current(20.0).value(), 20.0);
    }

    #[test]
    fn test_axis_state_codes() {
        assert_eq!(AxisState::Idle.code(), 1);
        assert_eq!(AxisState::ClosedLoopControl.code(), 8);
    }
}
