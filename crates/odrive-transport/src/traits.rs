use crate::{AxisCommand, AxisState, DeviceHandle, DeviceInfo, Result, SerialNumber, Telemetry};

/// A minimal blocking interface to a set of ODrive controllers.
///
/// Every call either completes or fails with a [`crate::TransportError`]; backends bound
/// each call by a transfer timeout so that a stalled device surfaces as
/// [`crate::TransportError::Timeout`] instead of blocking the caller.
pub trait DeviceGateway {
    /// Controllers visible to this backend.
    fn list(&mut self) -> Result<Vec<DeviceInfo>>;

    /// Open a connection to the controller with the given serial number.
    fn connect(&mut self, serial: SerialNumber) -> Result<DeviceHandle>;

    /// Close a connection opened by [`DeviceGateway::connect`].
    fn release(&mut self, handle: DeviceHandle) -> Result<()>;

    /// Request an axis state (idle, closed-loop control).
    fn set_axis_state(&mut self, handle: DeviceHandle, axis: u8, state: AxisState) -> Result<()>;

    /// Read one telemetry sample for an axis.
    fn read_telemetry(&mut self, handle: DeviceHandle, axis: u8) -> Result<Telemetry>;

    /// Send one setpoint to an axis.
    fn send_command(&mut self, handle: DeviceHandle, axis: u8, command: AxisCommand)
        -> Result<()>;

    /// Feed the axis watchdog.
    fn feed_watchdog(&mut self, handle: DeviceHandle, axis: u8) -> Result<()>;
}

impl<G: DeviceGateway + ?Sized> DeviceGateway for Box<G> {
    fn list(&mut self) -> Result<Vec<DeviceInfo>> {
        (**self).list()
    }

    fn connect(&mut self, serial: SerialNumber) -> Result<DeviceHandle> {
        (**self).connect(serial)
    }

    fn release(&mut self, handle: DeviceHandle) -> Result<()> {
        (**self).release(handle)
    }

    fn set_axis_state(&mut self, handle: DeviceHandle, axis: u8, state: AxisState) -> Result<()> {
        (**self).set_axis_state(handle, axis, state)
    }

    fn read_telemetry(&mut self, handle: DeviceHandle, axis: u8) -> Result<Telemetry> {
        (**self).read_telemetry(handle, axis)
    }

    fn send_command(
        &mut self,
        handle: DeviceHandle,
        axis: u8,
        command: AxisCommand,
    ) -> Result<()> {
        (**self).send_command(handle, axis, command)
    }

    fn feed_watchdog(&mut self, handle: DeviceHandle, axis: u8) -> Result<()> {
        (**self).feed_watchdog(handle, axis)
    }
}
