use crate::{AxisRegistry, Slot};
use std::fmt;
use std::sync::Arc;

/// Read-only quantities exported per joint.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum StateQuantity {
    Position,
    Velocity,
    Effort,
    VbusVoltage,
    AxisError,
    MotorError,
    EncoderError,
    ControllerError,
    FetTemperature,
    MotorTemperature,
}

impl StateQuantity {
    pub const ALL: [StateQuantity; 10] = [
        StateQuantity::Position,
        StateQuantity::Velocity,
        StateQuantity::Effort,
        StateQuantity::VbusVoltage,
        StateQuantity::AxisError,
        StateQuantity::MotorError,
        StateQuantity::EncoderError,
        StateQuantity::ControllerError,
        StateQuantity::FetTemperature,
        StateQuantity::MotorTemperature,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StateQuantity::Position => "position",
            StateQuantity::Velocity => "velocity",
            StateQuantity::Effort => "effort",
            StateQuantity::VbusVoltage => "vbus_voltage",
            StateQuantity::AxisError => "axis_error",
            StateQuantity::MotorError => "motor_error",
            StateQuantity::EncoderError => "encoder_error",
            StateQuantity::ControllerError => "controller_error",
            StateQuantity::FetTemperature => "fet_temperature",
            StateQuantity::MotorTemperature => "motor_temperature",
        }
    }
}

impl fmt::Display for StateQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writable quantities exported per joint.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CommandQuantity {
    Position,
    Velocity,
    Effort,
}

impl CommandQuantity {
    pub const ALL: [CommandQuantity; 3] = [
        CommandQuantity::Position,
        CommandQuantity::Velocity,
        CommandQuantity::Effort,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandQuantity::Position => "position",
            CommandQuantity::Velocity => "velocity",
            CommandQuantity::Effort => "effort",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.as_str() == s)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            CommandQuantity::Position => 0,
            CommandQuantity::Velocity => 1,
            CommandQuantity::Effort => 2,
        }
    }
}

impl fmt::Display for CommandQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn interface_name(joint: &str, quantity: &str) -> String {
    format!("{joint}/{quantity}")
}

/// Split `<joint>/<quantity>` into its parts.
pub(crate) fn split_interface_name(name: &str) -> Option<(&str, &str)> {
    name.rsplit_once('/')
}

/// A named read-only view of one state slot.
#[derive(Debug, Clone)]
pub struct StateInterface {
    name: String,
    joint: String,
    quantity: StateQuantity,
    slot: Arc<Slot>,
}

impl StateInterface {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joint(&self) -> &str {
        &self.joint
    }

    pub fn quantity(&self) -> StateQuantity {
        self.quantity
    }

    pub fn get(&self) -> f64 {
        self.slot.get()
    }
}

/// A named writable view of one command slot.
#[derive(Debug, Clone)]
pub struct CommandInterface {
    name: String,
    joint: String,
    quantity: CommandQuantity,
    slot: Arc<Slot>,
}

impl CommandInterface {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joint(&self) -> &str {
        &self.joint
    }

    pub fn quantity(&self) -> CommandQuantity {
        self.quantity
    }

    pub fn get(&self) -> f64 {
        self.slot.get()
    }

    pub fn set(&self, value: f64) {
        self.slot.set(value);
    }
}

pub fn export_state_interfaces(registry: &AxisRegistry) -> Vec<StateInterface> {
    let mut out = Vec::with_capacity(registry.len() * StateQuantity::ALL.len());
    for axis in registry.iter() {
        for quantity in StateQuantity::ALL {
            out.push(StateInterface {
                name: interface_name(&axis.name, quantity.as_str()),
                joint: axis.name.clone(),
                quantity,
                slot: Arc::clone(axis.state.slot(quantity)),
            });
        }
    }
    out
}

pub fn export_command_interfaces(registry: &AxisRegistry) -> Vec<CommandInterface> {
    let mut out = Vec::with_capacity(registry.len() * CommandQuantity::ALL.len());
    for axis in registry.iter() {
        for quantity in CommandQuantity::ALL {
            out.push(CommandInterface {
                name: interface_name(&axis.name, quantity.as_str()),
                joint: axis.name.clone(),
                quantity,
                slot: Arc::clone(axis.command.slot(quantity)),
            });
        }
    }
    out
}
