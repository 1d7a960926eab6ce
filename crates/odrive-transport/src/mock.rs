use crate::{
    AxisCommand, AxisState, DeviceGateway, DeviceHandle, DeviceInfo, Result, SerialNumber,
    Telemetry, TransportError,
};
use std::collections::BTreeMap;

/// Kind of gateway call, used to target injected faults.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallKind {
    Connect,
    Release,
    SetAxisState,
    ReadTelemetry,
    SendCommand,
    FeedWatchdog,
}

/// One call recorded by [`MockGateway`].
#[derive(Clone, Debug, PartialEq)]
pub enum GatewayCall {
    Connect(SerialNumber),
    Release(SerialNumber),
    SetAxisState {
        serial: SerialNumber,
        axis: u8,
        state: AxisState,
    },
    ReadTelemetry {
        serial: SerialNumber,
        axis: u8,
    },
    SendCommand {
        serial: SerialNumber,
        axis: u8,
        command: AxisCommand,
    },
    FeedWatchdog {
        serial: SerialNumber,
        axis: u8,
    },
}

impl GatewayCall {
    pub fn kind(&self) -> CallKind {
        match self {
            GatewayCall::Connect(_) => CallKind::Connect,
            GatewayCall::Release(_) => CallKind::Release,
            GatewayCall::SetAxisState { .. } => CallKind::SetAxisState,
            GatewayCall::ReadTelemetry { .. } => CallKind::ReadTelemetry,
            GatewayCall::SendCommand { .. } => CallKind::SendCommand,
            GatewayCall::FeedWatchdog { .. } => CallKind::FeedWatchdog,
        }
    }

    fn target(&self) -> (SerialNumber, Option<u8>) {
        match *self {
            GatewayCall::Connect(serial) | GatewayCall::Release(serial) => (serial, None),
            GatewayCall::SetAxisState { serial, axis, .. }
            | GatewayCall::ReadTelemetry { serial, axis }
            | GatewayCall::SendCommand { serial, axis, .. }
            | GatewayCall::FeedWatchdog { serial, axis } => (serial, Some(axis)),
        }
    }
}

#[derive(Clone, Debug)]
struct MockAxis {
    telemetry: Telemetry,
    state: AxisState,
    last_command: Option<AxisCommand>,
    watchdog_feeds: u64,
}

impl Default for MockAxis {
    fn default() -> Self {
        Self {
            telemetry: Telemetry {
                bus_voltage: 24.0,
                fet_temperature: 25.0,
                motor_temperature: 25.0,
                ..Telemetry::default()
            },
            state: AxisState::Idle,
            last_command: None,
            watchdog_feeds: 0,
        }
    }
}

#[derive(Clone, Debug)]
struct Fault {
    kind: CallKind,
    serial: Option<SerialNumber>,
    axis: Option<u8>,
    error: TransportError,
    remaining: Option<u32>,
}

impl Fault {
    fn matches(&self, call: &GatewayCall) -> bool {
        let (serial, axis) = call.target();
        self.kind == call.kind()
            && self.serial.map_or(true, |s| s == serial)
            && self.axis.map_or(true, |a| Some(a) == axis)
    }
}

/// In-process stand-in for a set of ODrive controllers.
///
/// Records every call, keeps per-axis state, and fails calls on demand. A setpoint
/// is reflected in the next telemetry sample of that axis: position and velocity
/// commands overwrite the estimate, current commands overwrite the measured current.
#[derive(Clone, Debug, Default)]
pub struct MockGateway {
    devices: BTreeMap<SerialNumber, [MockAxis; 2]>,
    connections: Vec<Option<SerialNumber>>,
    calls: Vec<GatewayCall>,
    faults: Vec<Fault>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, serial: SerialNumber) -> Self {
        self.add_device(serial);
        self
    }

    pub fn add_device(&mut self, serial: SerialNumber) {
        self.devices.entry(serial).or_default();
    }

    /// Replace the telemetry reported for an axis.
    pub fn set_telemetry(&mut self, serial: SerialNumber, axis: u8, telemetry: Telemetry) {
        if let Some(a) = self.axis_mut(serial, axis) {
            a.telemetry = telemetry;
        }
    }

    pub fn telemetry(&self, serial: SerialNumber, axis: u8) -> Option<Telemetry> {
        self.axis(serial, axis).map(|a| a.telemetry)
    }

    /// Fail every matching call until [`MockGateway::clear_faults`]. `None` matches any
    /// serial number or axis.
    pub fn inject_fault(
        &mut self,
        kind: CallKind,
        serial: Option<SerialNumber>,
        axis: Option<u8>,
        error: TransportError,
    ) {
        self.faults.push(Fault {
            kind,
            serial,
            axis,
            error,
            remaining: None,
        });
    }

    /// Fail only the next matching call.
    pub fn inject_fault_once(
        &mut self,
        kind: CallKind,
        serial: Option<SerialNumber>,
        axis: Option<u8>,
        error: TransportError,
    ) {
        self.faults.push(Fault {
            kind,
            serial,
            axis,
            error,
            remaining: Some(1),
        });
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    pub fn calls(&self) -> &[GatewayCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn count_calls(&self, kind: CallKind) -> usize {
        self.calls.iter().filter(|c| c.kind() == kind).count()
    }

    pub fn axis_state(&self, serial: SerialNumber, axis: u8) -> Option<AxisState> {
        self.axis(serial, axis).map(|a| a.state)
    }

    pub fn last_command(&self, serial: SerialNumber, axis: u8) -> Option<AxisCommand> {
        self.axis(serial, axis).and_then(|a| a.last_command)
    }

    pub fn watchdog_feeds(&self, serial: SerialNumber, axis: u8) -> u64 {
        self.axis(serial, axis).map_or(0, |a| a.watchdog_feeds)
    }

    pub fn is_connected(&self, serial: SerialNumber) -> bool {
        self.connections.iter().any(|c| *c == Some(serial))
    }

    fn axis(&self, serial: SerialNumber, axis: u8) -> Option<&MockAxis> {
        self.devices.get(&serial)?.get(axis as usize)
    }

    fn axis_mut(&mut self, serial: SerialNumber, axis: u8) -> Option<&mut MockAxis> {
        self.devices.get_mut(&serial)?.get_mut(axis as usize)
    }

    fn serial_for(&self, handle: DeviceHandle) -> Result<SerialNumber> {
        self.connections
            .get(handle.0)
            .copied()
            .flatten()
            .ok_or_else(|| TransportError::InvalidParam(format!("unknown handle {}", handle.0)))
    }

    /// Record a call and return the injected fault, if one matches.
    fn record(&mut self, call: GatewayCall) -> Result<()> {
        let hit = self.faults.iter().position(|f| f.matches(&call));
        self.calls.push(call);
        let Some(idx) = hit else {
            return Ok(());
        };
        let error = self.faults[idx].error.clone();
        let exhausted = match self.faults[idx].remaining.as_mut() {
            Some(n) => {
                *n = n.saturating_sub(1);
                *n == 0
            }
            None => false,
        };
        if exhausted {
            self.faults.remove(idx);
        }
        Err(error)
    }

    fn checked_axis(&mut self, serial: SerialNumber, axis: u8) -> Result<&mut MockAxis> {
        self.axis_mut(serial, axis)
            .ok_or_else(|| TransportError::InvalidParam(format!("axis {axis} out of range")))
    }
}

impl DeviceGateway for MockGateway {
    fn list(&mut self) -> Result<Vec<DeviceInfo>> {
        Ok(self
            .devices
            .keys()
            .map(|serial| DeviceInfo {
                serial: *serial,
                driver: "mock".to_string(),
            })
            .collect())
    }

    fn connect(&mut self, serial: SerialNumber) -> Result<DeviceHandle> {
        self.record(GatewayCall::Connect(serial))?;
        if !self.devices.contains_key(&serial) {
            return Err(TransportError::NoDevice(serial.to_string()));
        }
        if self.is_connected(serial) {
            return Err(TransportError::Busy);
        }
        self.connections.push(Some(serial));
        Ok(DeviceHandle(self.connections.len() - 1))
    }

    fn release(&mut self, handle: DeviceHandle) -> Result<()> {
        let serial = self.serial_for(handle)?;
        self.record(GatewayCall::Release(serial))?;
        self.connections[handle.0] = None;
        Ok(())
    }

    fn set_axis_state(&mut self, handle: DeviceHandle, axis: u8, state: AxisState) -> Result<()> {
        let serial = self.serial_for(handle)?;
        self.record(GatewayCall::SetAxisState {
            serial,
            axis,
            state,
        })?;
        self.checked_axis(serial, axis)?.state = state;
        Ok(())
    }

    fn read_telemetry(&mut self, handle: DeviceHandle, axis: u8) -> Result<Telemetry> {
        let serial = self.serial_for(handle)?;
        self.record(GatewayCall::ReadTelemetry { serial, axis })?;
        Ok(self.checked_axis(serial, axis)?.telemetry)
    }

    fn send_command(
        &mut self,
        handle: DeviceHandle,
        axis: u8,
        command: AxisCommand,
    ) -> Result<()> {
        let serial = self.serial_for(handle)?;
        self.record(GatewayCall::SendCommand {
            serial,
            axis,
            command,
        })?;
        let a = self.checked_axis(serial, axis)?;
        a.last_command = Some(command);
        match command {
            AxisCommand::Position(p) => a.telemetry.position = p,
            AxisCommand::Velocity(v) => a.telemetry.velocity = v,
            AxisCommand::Current(i) => a.telemetry.current = Some(i),
        }
        Ok(())
    }

    fn feed_watchdog(&mut self, handle: DeviceHandle, axis: u8) -> Result<()> {
        let serial = self.serial_for(handle)?;
        self.record(GatewayCall::FeedWatchdog { serial, axis })?;
        self.checked_axis(serial, axis)?.watchdog_feeds += 1;
        Ok(())
    }
}
