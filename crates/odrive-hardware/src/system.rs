use crate::cycle::{read_axes, write_axes, CycleDeadline};
use crate::interfaces::{export_command_interfaces, export_state_interfaces};
use crate::mode::{apply_mode_changes, plan_mode_switch};
use crate::{
    AxisRegistry, CommandInterface, CycleMetrics, HardwareError, HardwareInfo, Result,
    StateInterface,
};
use odrive_transport::{AxisState, DeviceGateway, DeviceHandle};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

/// Lifecycle of a hardware component as driven by the host framework.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LifecycleState {
    #[default]
    Unconfigured,
    Inactive,
    Active,
}

/// Entry points a control framework calls on a hardware component.
///
/// # Lifecycle
///
/// 1. `on_init` once with the hardware description
/// 2. `export_state_interfaces` / `export_command_interfaces` to bind channels
/// 3. `prepare_command_mode_switch` whenever controllers are renegotiated
/// 4. `on_activate`, then `read` and `write` once per control period
/// 5. `on_deactivate` when the component is stopped
///
/// Every call reports failure through its `Result`; none of them panic.
pub trait SystemInterface {
    fn on_init(&mut self, info: &HardwareInfo) -> Result<()>;

    fn export_state_interfaces(&self) -> Vec<StateInterface>;

    fn export_command_interfaces(&self) -> Vec<CommandInterface>;

    /// Accept or reject a controller switch. Rejection leaves every axis untouched.
    fn prepare_command_mode_switch(&mut self, start: &[String], stop: &[String]) -> Result<()>;

    fn on_activate(&mut self, previous: LifecycleState) -> Result<()>;

    fn on_deactivate(&mut self, previous: LifecycleState) -> Result<()>;

    /// Pull one telemetry sample per axis into the state channels.
    fn read(&mut self, time: OffsetDateTime, period: Duration) -> Result<()>;

    /// Push the authoritative command channel of every axis to its controller.
    fn write(&mut self, time: OffsetDateTime, period: Duration) -> Result<()>;
}

/// ODrive axes behind a [`DeviceGateway`], driven as one hardware component.
pub struct OdriveSystem<G: DeviceGateway> {
    gateway: G,
    registry: AxisRegistry,
    /// Open connection per entry of [`AxisRegistry::devices`], while active.
    handles: Vec<Option<DeviceHandle>>,
    state: LifecycleState,
    last_read_failed: bool,
    metrics: CycleMetrics,
}

impl<G: DeviceGateway> OdriveSystem<G> {
    pub fn new(gateway: G) -> Result<Self> {
        Ok(Self {
            gateway,
            registry: AxisRegistry::default(),
            handles: Vec::new(),
            state: LifecycleState::Unconfigured,
            last_read_failed: false,
            metrics: CycleMetrics::new().map_err(HardwareError::Metrics)?,
        })
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn registry(&self) -> &AxisRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &CycleMetrics {
        &self.metrics
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    fn ensure_active(&self, operation: &'static str) -> Result<()> {
        if self.state == LifecycleState::Active {
            return Ok(());
        }
        error!(operation, state = ?self.state, "hardware not active");
        Err(HardwareError::InvalidLifecycle {
            operation,
            state: self.state,
        })
    }

    /// Command every axis on an open connection to idle. Returns the first failure.
    fn idle_axes(&mut self) -> Option<HardwareError> {
        let mut first = None;
        for axis in self.registry.iter() {
            let Some(handle) = self.handles.get(axis.device).copied().flatten() else {
                continue;
            };
            if let Err(source) = self
                .gateway
                .set_axis_state(handle, axis.axis_index, AxisState::Idle)
            {
                warn!(
                    joint = %axis.name,
                    error = source.name(),
                    "failed to idle axis: {source}"
                );
                first.get_or_insert(HardwareError::Transport {
                    joint: axis.name.clone(),
                    source,
                });
            }
        }
        first
    }

    /// Release every open connection. Returns the first failure.
    fn release_devices(&mut self) -> Option<HardwareError> {
        let mut first = None;
        let devices = self.registry.devices();
        for (slot, serial) in self.handles.iter_mut().zip(devices) {
            let Some(handle) = slot.take() else {
                continue;
            };
            if let Err(source) = self.gateway.release(handle) {
                warn!(serial = %serial, error = source.name(), "failed to release ODrive: {source}");
                first.get_or_insert(HardwareError::Connection {
                    serial: *serial,
                    source,
                });
            }
        }
        first
    }
}

impl<G: DeviceGateway> SystemInterface for OdriveSystem<G> {
    fn on_init(&mut self, info: &HardwareInfo) -> Result<()> {
        if self.state == LifecycleState::Active {
            error!("on_init called on an active system");
            return Err(HardwareError::InvalidLifecycle {
                operation: "on_init",
                state: self.state,
            });
        }
        self.state = LifecycleState::Unconfigured;
        self.registry = AxisRegistry::default();
        self.handles.clear();

        let registry = info
            .usb_timeout()
            .and_then(|_| AxisRegistry::from_hardware_info(info))
            .map_err(|e| {
                error!(hardware = %info.name, "invalid hardware description: {e}");
                HardwareError::Configuration(e)
            })?;
        for axis in registry.iter() {
            debug!(
                joint = %axis.name,
                serial = %axis.serial_number,
                axis = axis.axis_index,
                torque_constant = axis.torque_constant,
                watchdog = axis.watchdog_enabled,
                "joint mapped"
            );
        }
        info!(
            hardware = %info.name,
            joints = registry.len(),
            devices = registry.devices().len(),
            "hardware configured"
        );
        self.handles = vec![None; registry.devices().len()];
        self.registry = registry;
        self.state = LifecycleState::Inactive;
        Ok(())
    }

    fn export_state_interfaces(&self) -> Vec<StateInterface> {
        export_state_interfaces(&self.registry)
    }

    fn export_command_interfaces(&self) -> Vec<CommandInterface> {
        export_command_interfaces(&self.registry)
    }

    fn prepare_command_mode_switch(&mut self, start: &[String], stop: &[String]) -> Result<()> {
        let changes = plan_mode_switch(&self.registry, start, stop).map_err(|e| {
            warn!("mode switch rejected: {e}");
            e
        })?;
        for change in &changes {
            if let Some(axis) = self.registry.axis(change.axis) {
                debug!(joint = %axis.name, from = ?change.from, to = ?change.to, "control mode change");
            }
        }
        apply_mode_changes(&mut self.registry, &changes);
        Ok(())
    }

    fn on_activate(&mut self, previous: LifecycleState) -> Result<()> {
        if self.state != LifecycleState::Inactive {
            error!(state = ?self.state, "on_activate requires a configured, inactive system");
            return Err(HardwareError::InvalidLifecycle {
                operation: "on_activate",
                state: self.state,
            });
        }
        debug!(?previous, "activating");

        let devices = self.registry.devices().to_vec();
        self.handles = vec![None; devices.len()];
        for (idx, serial) in devices.iter().enumerate() {
            match self.gateway.connect(*serial) {
                Ok(handle) => {
                    debug!(serial = %serial, "connected");
                    self.handles[idx] = Some(handle);
                }
                Err(source) => {
                    error!(serial = %serial, error = source.name(), "failed to connect: {source}");
                    self.release_devices();
                    return Err(HardwareError::Connection {
                        serial: *serial,
                        source,
                    });
                }
            }
        }

        let mut failure = None;
        for axis in self.registry.iter() {
            let Some(handle) = self.handles.get(axis.device).copied().flatten() else {
                continue;
            };
            if let Err(source) =
                self.gateway
                    .set_axis_state(handle, axis.axis_index, AxisState::ClosedLoopControl)
            {
                error!(
                    joint = %axis.name,
                    error = source.name(),
                    "failed to enter closed-loop control: {source}"
                );
                failure = Some(HardwareError::Transport {
                    joint: axis.name.clone(),
                    source,
                });
                break;
            }
        }
        if let Some(err) = failure {
            self.idle_axes();
            self.release_devices();
            return Err(err);
        }

        self.last_read_failed = false;
        self.state = LifecycleState::Active;
        info!(
            devices = devices.len(),
            joints = self.registry.len(),
            "hardware activated"
        );
        Ok(())
    }

    fn on_deactivate(&mut self, previous: LifecycleState) -> Result<()> {
        if self.state != LifecycleState::Active {
            debug!(state = ?self.state, ?previous, "nothing to deactivate");
            return Ok(());
        }
        let idle_err = self.idle_axes();
        let release_err = self.release_devices();
        self.state = LifecycleState::Inactive;
        match idle_err.or(release_err) {
            Some(err) => {
                warn!("hardware deactivated with errors: {err}");
                Err(err)
            }
            None => {
                info!("hardware deactivated");
                Ok(())
            }
        }
    }

    fn read(&mut self, time: OffsetDateTime, period: Duration) -> Result<()> {
        self.ensure_active("read")?;
        self.metrics.period_seconds.set(period.as_secs_f64());
        let deadline = CycleDeadline::new(period);
        let res = read_axes(
            &self.registry,
            &mut self.gateway,
            &self.handles,
            &deadline,
            &self.metrics,
        );
        self.metrics
            .read_duration_seconds
            .set(deadline.elapsed().as_secs_f64());
        self.last_read_failed = res.is_err();
        match &res {
            Ok(()) => self.metrics.reads.inc(),
            Err(e) => error!(at = %time, "read cycle failed: {e}"),
        }
        res
    }

    fn write(&mut self, time: OffsetDateTime, period: Duration) -> Result<()> {
        self.ensure_active("write")?;
        if self.last_read_failed {
            warn!(at = %time, "read failed this cycle, no commands sent");
            return Err(HardwareError::CycleAborted);
        }
        let deadline = CycleDeadline::new(period);
        let res = write_axes(
            &self.registry,
            &mut self.gateway,
            &self.handles,
            &deadline,
            &self.metrics,
        );
        self.metrics
            .write_duration_seconds
            .set(deadline.elapsed().as_secs_f64());
        match &res {
            Ok(()) => self.metrics.writes.inc(),
            Err(e) => error!(at = %time, "write cycle failed: {e}"),
        }
        res
    }
}
