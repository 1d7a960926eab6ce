//! Endpoint ids of the ODrive native protocol.
//!
//! Ids are assigned by the firmware when it generates its interface description, so
//! they differ between firmware releases. They are read from a YAML file generated
//! for the firmware in use instead of being compiled in.

use crate::{Result, TransportError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointMap {
    /// CRC of the firmware's JSON interface description, sent as packet trailer.
    pub json_crc: u16,
    pub vbus_voltage: u16,
    pub axes: Vec<AxisEndpoints>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisEndpoints {
    pub error: u16,
    pub requested_state: u16,
    pub pos_estimate: u16,
    pub vel_estimate: u16,
    #[serde(default)]
    pub iq_measured: Option<u16>,
    pub motor_error: u16,
    pub encoder_error: u16,
    pub controller_error: u16,
    pub fet_temperature: u16,
    pub motor_temperature: u16,
    pub input_pos: u16,
    pub input_vel: u16,
    pub input_current: u16,
    pub watchdog_feed: u16,
}

impl EndpointMap {
    pub fn axis(&self, axis: u8) -> Result<&AxisEndpoints> {
        self.axes
            .get(axis as usize)
            .ok_or_else(|| TransportError::InvalidParam(format!("no endpoints for axis {axis}")))
    }
}
