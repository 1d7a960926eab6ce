use crate::protocol::{self, Sequencer, MAX_PACKET_SIZE};
use crate::{
    AxisCommand, AxisState, DeviceGateway, DeviceHandle, DeviceInfo, EndpointMap, Result,
    SerialNumber, Telemetry, TransportError,
};
use rusb::{DeviceHandle as UsbHandle, GlobalContext};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Interface carrying the native protocol on ODrive v3 boards.
const NATIVE_INTERFACE: u8 = 2;
/// Responses for other sequence numbers dropped before giving up on a request.
const MAX_STALE_RESPONSES: usize = 4;

fn is_odrive(vendor_id: u16, product_id: u16) -> bool {
    matches!(
        (vendor_id, product_id),
        (0x1209, 0x0D31) | (0x1209, 0x0D32) | (0x1209, 0x0D33)
    )
}

struct Connection {
    serial: SerialNumber,
    handle: UsbHandle<GlobalContext>,
    endpoint_in: u8,
    endpoint_out: u8,
    seq: Sequencer,
}

/// ODrive native protocol over USB bulk endpoints.
pub struct UsbGateway {
    endpoints: EndpointMap,
    timeout: Duration,
    connections: Vec<Option<Connection>>,
}

impl UsbGateway {
    /// `timeout` bounds every USB transfer; keep it below the control period.
    pub fn new(endpoints: EndpointMap, timeout: Duration) -> Self {
        Self {
            endpoints,
            timeout,
            connections: Vec::new(),
        }
    }

    fn connection(&mut self, handle: DeviceHandle) -> Result<&mut Connection> {
        self.connections
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| TransportError::InvalidParam(format!("unknown handle {}", handle.0)))
    }

    fn read_serial(
        device: &rusb::Device<GlobalContext>,
        handle: &UsbHandle<GlobalContext>,
    ) -> Option<SerialNumber> {
        let desc = device.device_descriptor().ok()?;
        let idx = desc.serial_number_string_index()?;
        let text = handle.read_string_descriptor_ascii(idx).ok()?;
        text.parse().ok()
    }

    fn find_bulk_endpoints(device: &rusb::Device<GlobalContext>) -> Option<(u8, u8)> {
        let config = device.active_config_descriptor().ok()?;
        let interface = config
            .interfaces()
            .find(|i| i.number() == NATIVE_INTERFACE)?;
        let desc = interface.descriptors().next()?;
        let mut endpoint_in = None;
        let mut endpoint_out = None;
        for ep in desc.endpoint_descriptors() {
            if ep.transfer_type() == rusb::TransferType::Bulk {
                match ep.direction() {
                    rusb::Direction::In => endpoint_in = Some(ep.address()),
                    rusb::Direction::Out => endpoint_out = Some(ep.address()),
                }
            }
        }
        Some((endpoint_in?, endpoint_out?))
    }

    fn exchange(
        &mut self,
        handle: DeviceHandle,
        endpoint: u16,
        payload: &[u8],
        response_len: u16,
    ) -> Result<Vec<u8>> {
        let timeout = self.timeout;
        let json_crc = self.endpoints.json_crc;
        let conn = self.connection(handle)?;
        let seq = conn.seq.next();
        let request = protocol::encode_request(seq, endpoint, response_len, payload, json_crc)?;
        trace!(serial = %conn.serial, endpoint, seq, "usb request");
        conn.handle
            .write_bulk(conn.endpoint_out, &request, timeout)?;

        let mut buf = [0u8; MAX_PACKET_SIZE];
        for _ in 0..MAX_STALE_RESPONSES {
            let n = conn.handle.read_bulk(conn.endpoint_in, &mut buf, timeout)?;
            if let Some(body) = protocol::parse_response(seq, &buf[..n])? {
                return Ok(body.to_vec());
            }
            debug!(serial = %conn.serial, seq, "dropping stale response");
        }
        Err(TransportError::Protocol("no response for request"))
    }

    fn read_f32(&mut self, handle: DeviceHandle, endpoint: u16) -> Result<f32> {
        protocol::decode_f32(&self.exchange(handle, endpoint, &[], 4)?)
    }

    fn read_u32(&mut self, handle: DeviceHandle, endpoint: u16) -> Result<u32> {
        protocol::decode_u32(&self.exchange(handle, endpoint, &[], 4)?)
    }

    fn read_u64(&mut self, handle: DeviceHandle, endpoint: u16) -> Result<u64> {
        protocol::decode_u64(&self.exchange(handle, endpoint, &[], 8)?)
    }

    fn write_value(&mut self, handle: DeviceHandle, endpoint: u16, bytes: &[u8]) -> Result<()> {
        self.exchange(handle, endpoint, bytes, 0).map(|_| ())
    }
}

impl DeviceGateway for UsbGateway {
    fn list(&mut self) -> Result<Vec<DeviceInfo>> {
        let mut out = Vec::new();
        for device in rusb::devices()?.iter() {
            let Ok(desc) = device.device_descriptor() else {
                continue;
            };
            if !is_odrive(desc.vendor_id(), desc.product_id()) {
                continue;
            }
            let Ok(handle) = device.open() else {
                continue;
            };
            if let Some(serial) = Self::read_serial(&device, &handle) {
                out.push(DeviceInfo {
                    serial,
                    driver: "odrive-usb".to_string(),
                });
            }
        }
        Ok(out)
    }

    fn connect(&mut self, serial: SerialNumber) -> Result<DeviceHandle> {
        for device in rusb::devices()?.iter() {
            let Ok(desc) = device.device_descriptor() else {
                continue;
            };
            if !is_odrive(desc.vendor_id(), desc.product_id()) {
                continue;
            }
            let Ok(mut handle) = device.open() else {
                continue;
            };
            if Self::read_serial(&device, &handle) != Some(serial) {
                continue;
            }
            let (endpoint_in, endpoint_out) = Self::find_bulk_endpoints(&device)
                .ok_or(TransportError::Protocol("native interface not found"))?;
            if handle.kernel_driver_active(NATIVE_INTERFACE).unwrap_or(false) {
                handle.detach_kernel_driver(NATIVE_INTERFACE)?;
            }
            handle.claim_interface(NATIVE_INTERFACE)?;
            debug!(%serial, endpoint_in, endpoint_out, "connected");
            self.connections.push(Some(Connection {
                serial,
                handle,
                endpoint_in,
                endpoint_out,
                seq: Sequencer::default(),
            }));
            return Ok(DeviceHandle(self.connections.len() - 1));
        }
        Err(TransportError::NoDevice(serial.to_string()))
    }

    fn release(&mut self, handle: DeviceHandle) -> Result<()> {
        let mut conn = self
            .connections
            .get_mut(handle.0)
            .and_then(Option::take)
            .ok_or_else(|| TransportError::InvalidParam(format!("unknown handle {}", handle.0)))?;
        if let Err(e) = conn.handle.release_interface(NATIVE_INTERFACE) {
            warn!(serial = %conn.serial, error = %e, "release_interface failed");
            return Err(e.into());
        }
        Ok(())
    }

    fn set_axis_state(&mut self, handle: DeviceHandle, axis: u8, state: AxisState) -> Result<()> {
        let ep = self.endpoints.axis(axis)?.requested_state;
        self.write_value(handle, ep, &state.code().to_le_bytes())
    }

    fn read_telemetry(&mut self, handle: DeviceHandle, axis: u8) -> Result<Telemetry> {
        let ep = self.endpoints.axis(axis)?.clone();
        let vbus = self.endpoints.vbus_voltage;
        let current = match ep.iq_measured {
            Some(id) => Some(self.read_f32(handle, id)?),
            None => None,
        };
        Ok(Telemetry {
            position: self.read_f32(handle, ep.pos_estimate)?,
            velocity: self.read_f32(handle, ep.vel_estimate)?,
            current,
            bus_voltage: self.read_f32(handle, vbus)?,
            axis_error: self.read_u32(handle, ep.error)?,
            motor_error: self.read_u64(handle, ep.motor_error)?,
            encoder_error: self.read_u32(handle, ep.encoder_error)?,
            controller_error: self.read_u32(handle, ep.controller_error)?,
            fet_temperature: self.read_f32(handle, ep.fet_temperature)?,
            motor_temperature: self.read_f32(handle, ep.motor_temperature)?,
        })
    }

    fn send_command(
        &mut self,
        handle: DeviceHandle,
        axis: u8,
        command: AxisCommand,
    ) -> Result<()> {
        let ep = self.endpoints.axis(axis)?;
        let id = match command {
            AxisCommand::Position(_) => ep.input_pos,
            AxisCommand::Velocity(_) => ep.input_vel,
            AxisCommand::Current(_) => ep.input_current,
        };
        self.write_value(handle, id, &command.value().to_le_bytes())
    }

    fn feed_watchdog(&mut self, handle: DeviceHandle, axis: u8) -> Result<()> {
        let ep = self.endpoints.axis(axis)?.watchdog_feed;
        self.write_value(handle, ep, &[])
    }
}
