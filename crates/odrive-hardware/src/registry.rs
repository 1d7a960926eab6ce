use crate::interfaces::{CommandQuantity, StateQuantity};
use crate::{ConfigError, ControlLevel, HardwareInfo, JointConfig, Slot};
use odrive_transport::SerialNumber;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct StateSlots {
    pub position: Arc<Slot>,
    pub velocity: Arc<Slot>,
    pub effort: Arc<Slot>,
    pub bus_voltage: Arc<Slot>,
    pub axis_error: Arc<Slot>,
    pub motor_error: Arc<Slot>,
    pub encoder_error: Arc<Slot>,
    pub controller_error: Arc<Slot>,
    pub fet_temperature: Arc<Slot>,
    pub motor_temperature: Arc<Slot>,
}

impl StateSlots {
    pub fn slot(&self, quantity: StateQuantity) -> &Arc<Slot> {
        match quantity {
            StateQuantity::Position => &self.position,
            StateQuantity::Velocity => &self.velocity,
            StateQuantity::Effort => &self.effort,
            StateQuantity::VbusVoltage => &self.bus_voltage,
            StateQuantity::AxisError => &self.axis_error,
            StateQuantity::MotorError => &self.motor_error,
            StateQuantity::EncoderError => &self.encoder_error,
            StateQuantity::ControllerError => &self.controller_error,
            StateQuantity::FetTemperature => &self.fet_temperature,
            StateQuantity::MotorTemperature => &self.motor_temperature,
        }
    }
}

/// Command storage. Slots start as NaN, meaning "not yet commanded".
#[derive(Debug)]
pub struct CommandSlots {
    pub position: Arc<Slot>,
    pub velocity: Arc<Slot>,
    pub effort: Arc<Slot>,
}

impl Default for CommandSlots {
    fn default() -> Self {
        Self {
            position: Arc::new(Slot::new(f64::NAN)),
            velocity: Arc::new(Slot::new(f64::NAN)),
            effort: Arc::new(Slot::new(f64::NAN)),
        }
    }
}

impl CommandSlots {
    pub fn slot(&self, quantity: CommandQuantity) -> &Arc<Slot> {
        match quantity {
            CommandQuantity::Position => &self.position,
            CommandQuantity::Velocity => &self.velocity,
            CommandQuantity::Effort => &self.effort,
        }
    }
}

/// One configured joint and the ODrive axis driving it.
#[derive(Debug)]
pub struct Axis {
    pub name: String,
    pub serial_number: SerialNumber,
    pub axis_index: u8,
    /// N·m per A.
    pub torque_constant: f64,
    pub watchdog_enabled: bool,
    pub state: StateSlots,
    pub command: CommandSlots,
    /// Index of this axis's controller in [`AxisRegistry::devices`].
    pub(crate) device: usize,
    control_level: ControlLevel,
}

impl Axis {
    pub fn control_level(&self) -> ControlLevel {
        self.control_level
    }

    pub(crate) fn set_control_level(&mut self, level: ControlLevel) {
        self.control_level = level;
    }
}

/// Axes in declaration order plus the distinct controllers they live on.
#[derive(Debug, Default)]
pub struct AxisRegistry {
    axes: Vec<Axis>,
    devices: Vec<SerialNumber>,
}

impl AxisRegistry {
    /// Build from already validated joint configurations.
    pub fn from_configs(configs: Vec<JointConfig>) -> Self {
        let mut reg = AxisRegistry::default();
        for cfg in configs {
            let device = match reg.devices.iter().position(|s| *s == cfg.serial_number) {
                Some(idx) => idx,
                None => {
                    reg.devices.push(cfg.serial_number);
                    reg.devices.len() - 1
                }
            };
            reg.axes.push(Axis {
                name: cfg.name,
                serial_number: cfg.serial_number,
                axis_index: cfg.axis,
                torque_constant: cfg.torque_constant,
                watchdog_enabled: cfg.enable_watchdog,
                state: StateSlots::default(),
                command: CommandSlots::default(),
                device,
                control_level: ControlLevel::Undefined,
            });
        }
        reg
    }

    pub fn from_hardware_info(info: &HardwareInfo) -> Result<Self, ConfigError> {
        Ok(Self::from_configs(info.joint_configs()?))
    }

    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Axis> {
        self.axes.iter()
    }

    pub(crate) fn axes_mut(&mut self) -> &mut [Axis] {
        &mut self.axes
    }

    pub fn axis(&self, index: usize) -> Option<&Axis> {
        self.axes.get(index)
    }

    pub fn index_of(&self, joint: &str) -> Option<usize> {
        self.axes.iter().position(|a| a.name == joint)
    }

    pub fn get(&self, joint: &str) -> Option<&Axis> {
        self.index_of(joint).map(|i| &self.axes[i])
    }

    /// Distinct controllers, in order of first appearance.
    pub fn devices(&self) -> &[SerialNumber] {
        &self.devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(name: &str, serial: u64, axis: u8) -> JointConfig {
        JointConfig {
            name: name.into(),
            serial_number: SerialNumber::new(serial),
            axis,
            torque_constant: 0.05,
            enable_watchdog: false,
        }
    }

    #[test]
    fn test_registry_groups_devices() {
        let reg = AxisRegistry::from_configs(vec![
            cfg("front_left", 1, 0),
            cfg("back_left", 2, 0),
            cfg("front_right", 1, 1),
        ]);
        assert_eq!(reg.len(), 3);
        assert_eq!(
            reg.devices(),
            &[SerialNumber::new(1), SerialNumber::new(2)]
        );
        assert_eq!(reg.get("front_right").unwrap().device, 0);
        assert_eq!(reg.get("back_left").unwrap().device, 1);
        assert_eq!(reg.index_of("missing"), None);
    }

    #[test]
    fn test_new_axis_is_undefined_and_uncommanded() {
        let reg = AxisRegistry::from_configs(vec![cfg("j", 1, 0)]);
        let axis = reg.axis(0).unwrap();
        assert_eq!(axis.control_level(), ControlLevel::Undefined);
        assert!(axis.command.velocity.get().is_nan());
        assert_eq!(axis.state.position.get(), 0.0);
    }
}
