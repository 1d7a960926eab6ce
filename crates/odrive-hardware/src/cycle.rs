use crate::units::{current_to_effort, effort_to_current, radians_to_turns, turns_to_radians};
use crate::{Axis, AxisRegistry, ControlLevel, CycleMetrics, HardwareError, Result};
use odrive_transport::{AxisCommand, DeviceGateway, DeviceHandle, Telemetry, TransportError};
use std::time::{Duration, Instant};
use tracing::{error, trace, warn};

/// Time budget of one `read()` or `write()` call.
///
/// A gateway call that starts or returns after the budget is spent counts as a
/// transport timeout for the cycle. A zero period disables the budget.
#[derive(Debug, Clone, Copy)]
pub struct CycleDeadline {
    start: Instant,
    budget: Option<Duration>,
}

impl CycleDeadline {
    pub fn new(period: Duration) -> Self {
        Self {
            start: Instant::now(),
            budget: (!period.is_zero()).then_some(period),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn expired(&self) -> bool {
        self.budget.map_or(false, |b| self.elapsed() > b)
    }

    /// Run one gateway call inside the budget.
    pub fn guard<T>(
        &self,
        call: impl FnOnce() -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        if self.expired() {
            return Err(TransportError::Timeout);
        }
        let out = call()?;
        if self.expired() {
            return Err(TransportError::Timeout);
        }
        Ok(out)
    }
}

fn handle_for(axis: &Axis, handles: &[Option<DeviceHandle>]) -> Result<DeviceHandle, TransportError> {
    handles
        .get(axis.device)
        .copied()
        .flatten()
        .ok_or_else(|| TransportError::NoDevice(axis.serial_number.to_string()))
}

fn fail(
    axis: &Axis,
    op: &'static str,
    err: TransportError,
    deadline: &CycleDeadline,
    metrics: &CycleMetrics,
) -> HardwareError {
    if err == TransportError::Timeout && deadline.expired() {
        metrics.deadline_misses.inc();
        warn!(joint = %axis.name, elapsed_us = deadline.elapsed().as_micros() as u64, "{op}: cycle deadline missed");
    }
    metrics.transport_failures.inc();
    error!(
        joint = %axis.name,
        serial = %axis.serial_number,
        axis = axis.axis_index,
        error = err.name(),
        "{op} failed: {err}"
    );
    HardwareError::Transport {
        joint: axis.name.clone(),
        source: err,
    }
}

fn store_telemetry(axis: &Axis, t: &Telemetry) {
    let s = &axis.state;
    s.position.set(turns_to_radians(f64::from(t.position)));
    s.velocity.set(turns_to_radians(f64::from(t.velocity)));
    if let Some(current) = t.current {
        s.effort
            .set(current_to_effort(f64::from(current), axis.torque_constant));
    }
    s.bus_voltage.set(f64::from(t.bus_voltage));
    s.axis_error.set(f64::from(t.axis_error));
    s.motor_error.set(t.motor_error as f64);
    s.encoder_error.set(f64::from(t.encoder_error));
    s.controller_error.set(f64::from(t.controller_error));
    s.fet_temperature.set(f64::from(t.fet_temperature));
    s.motor_temperature.set(f64::from(t.motor_temperature));
}

/// Read telemetry for every axis in registry order, stopping at the first failure.
pub(crate) fn read_axes<G: DeviceGateway + ?Sized>(
    registry: &AxisRegistry,
    gateway: &mut G,
    handles: &[Option<DeviceHandle>],
    deadline: &CycleDeadline,
    metrics: &CycleMetrics,
) -> Result<()> {
    for axis in registry.iter() {
        let telemetry = handle_for(axis, handles)
            .and_then(|h| deadline.guard(|| gateway.read_telemetry(h, axis.axis_index)))
            .map_err(|e| fail(axis, "read_telemetry", e, deadline, metrics))?;
        store_telemetry(axis, &telemetry);
    }
    Ok(())
}

/// The setpoint `write()` sends for an axis, if any.
pub(crate) fn command_for(axis: &Axis) -> Option<AxisCommand> {
    let cmd = match axis.control_level() {
        ControlLevel::Undefined => return None,
        ControlLevel::Position => {
            AxisCommand::Position(radians_to_turns(axis.command.position.get()) as f32)
        }
        ControlLevel::Velocity => {
            AxisCommand::Velocity(radians_to_turns(axis.command.velocity.get()) as f32)
        }
        ControlLevel::Effort => AxisCommand::Current(
            effort_to_current(axis.command.effort.get(), axis.torque_constant) as f32,
        ),
    };
    // NaN until the framework writes the slot
    if !cmd.value().is_finite() {
        trace!(joint = %axis.name, ?cmd, "no finite setpoint, skipping");
        return None;
    }
    Some(cmd)
}

/// Send the authoritative setpoint and feed the watchdog for every axis in registry
/// order, stopping at the first failure.
pub(crate) fn write_axes<G: DeviceGateway + ?Sized>(
    registry: &AxisRegistry,
    gateway: &mut G,
    handles: &[Option<DeviceHandle>],
    deadline: &CycleDeadline,
    metrics: &CycleMetrics,
) -> Result<()> {
    for axis in registry.iter() {
        let handle =
            handle_for(axis, handles).map_err(|e| fail(axis, "write", e, deadline, metrics))?;
        if let Some(cmd) = command_for(axis) {
            deadline
                .guard(|| gateway.send_command(handle, axis.axis_index, cmd))
                .map_err(|e| fail(axis, "send_command", e, deadline, metrics))?;
            metrics.commands_sent.inc();
        }
        if axis.watchdog_enabled {
            deadline
                .guard(|| gateway.feed_watchdog(handle, axis.axis_index))
                .map_err(|e| fail(axis, "feed_watchdog", e, deadline, metrics))?;
            metrics.watchdog_feeds.inc();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::{apply_mode_changes, ModeChange};
    use crate::JointConfig;
    use odrive_transport::{MockGateway, SerialNumber};

    const SN: SerialNumber = SerialNumber::new(0x3597_524B);

    fn registry(levels: &[ControlLevel]) -> AxisRegistry {
        let mut reg = AxisRegistry::from_configs(
            levels
                .iter()
                .enumerate()
                .map(|(i, _)| JointConfig {
                    name: format!("j{i}"),
                    serial_number: SN,
                    axis: i as u8,
                    torque_constant: 0.05,
                    enable_watchdog: false,
                })
                .collect(),
        );
        let changes: Vec<ModeChange> = levels
            .iter()
            .enumerate()
            .map(|(i, l)| ModeChange {
                axis: i,
                from: ControlLevel::Undefined,
                to: *l,
            })
            .collect();
        apply_mode_changes(&mut reg, &changes);
        reg
    }

    #[test]
    fn test_command_for_each_level() {
        let reg = registry(&[ControlLevel::Effort, ControlLevel::Position]);
        let effort = reg.axis(0).unwrap();
        effort.command.effort.set(1.0);
        effort.command.position.set(3.0);
        assert_eq!(command_for(effort), Some(AxisCommand::Current(20.0)));

        let pos = reg.axis(1).unwrap();
        pos.command.position.set(std::f64::consts::PI);
        assert_eq!(command_for(pos), Some(AxisCommand::Position(0.5)));
    }

    #[test]
    fn test_undefined_and_unset_send_nothing() {
        let reg = registry(&[ControlLevel::Undefined, ControlLevel::Velocity]);
        reg.axis(0).unwrap().command.velocity.set(1.0);
        assert_eq!(command_for(reg.axis(0).unwrap()), None);
        assert_eq!(command_for(reg.axis(1).unwrap()), None);
    }

    #[test]
    fn test_read_converts_units() {
        let reg = registry(&[ControlLevel::Undefined]);
        let mut gw = MockGateway::new().with_device(SN);
        gw.set_telemetry(
            SN,
            0,
            Telemetry {
                position: 0.5,
                velocity: -2.0,
                current: Some(4.0),
                bus_voltage: 24.0,
                motor_error: 0x1_0000_0001,
                ..Telemetry::default()
            },
        );
        let h = gw.connect(SN).unwrap();
        let metrics = CycleMetrics::new().unwrap();
        let deadline = CycleDeadline::new(Duration::ZERO);
        read_axes(&reg, &mut gw, &[Some(h)], &deadline, &metrics).unwrap();

        let s = &reg.axis(0).unwrap().state;
        assert!((s.position.get() - std::f64::consts::PI).abs() < 1e-9);
        assert!((s.velocity.get() + 4.0 * std::f64::consts::PI).abs() < 1e-9);
        assert!((s.effort.get() - 0.2).abs() < 1e-6);
        assert_eq!(s.bus_voltage.get(), 24.0);
        assert_eq!(s.motor_error.get(), 4_294_967_297.0);
    }

    #[test]
    fn test_late_device_error_is_not_a_deadline_miss() {
        let reg = registry(&[ControlLevel::Undefined]);
        let mut gw = MockGateway::new().with_device(SN);
        let h = gw.connect(SN).unwrap();
        let metrics = CycleMetrics::new().unwrap();
        let deadline = CycleDeadline::new(Duration::from_nanos(1));
        std::thread::sleep(Duration::from_millis(1));

        // an expired budget fails the call before it reaches the device
        let err = read_axes(&reg, &mut gw, &[Some(h)], &deadline, &metrics).unwrap_err();
        assert_eq!(err.transport(), Some(&TransportError::Timeout));
        assert_eq!(metrics.deadline_misses.get(), 1);

        // a device error reported after the budget ran out keeps its own kind
        let err = fail(
            reg.axis(0).unwrap(),
            "read_telemetry",
            TransportError::Pipe,
            &deadline,
            &metrics,
        );
        assert_eq!(err.transport(), Some(&TransportError::Pipe));
        assert_eq!(metrics.deadline_misses.get(), 1);
        assert_eq!(metrics.transport_failures.get(), 2);
    }

    #[test]
    fn test_expired_deadline_is_timeout() {
        let deadline = CycleDeadline::new(Duration::from_nanos(1));
        std::thread::sleep(Duration::from_millis(1));
        assert!(deadline.expired());
        assert_eq!(deadline.guard(|| Ok(())), Err(TransportError::Timeout));
        assert!(!CycleDeadline::new(Duration::ZERO).expired());
    }
}
