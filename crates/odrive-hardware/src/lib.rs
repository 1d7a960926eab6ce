//! odrive-hardware: ODrive axes as a cyclic hardware interface
//!
//! Joints described in a YAML hardware description are mapped onto ODrive axes. Each
//! joint is exported to the host framework as named state and command channels bound
//! to shared storage slots; [`OdriveSystem`] moves data between those slots and the
//! controllers once per control period through a [`odrive_transport::DeviceGateway`].

mod error;
pub use error::{ConfigError, HardwareError, Result};

mod config;
pub use config::{
    load_hardware_info_file, parse_hardware_info, HardwareInfo, JointConfig, JointInfo, ParamValue,
};

mod slot;
pub use slot::Slot;

mod units;
pub use units::{
    current_to_effort, effort_to_current, radians_to_turns, turns_to_radians, RADIANS_PER_TURN,
};

mod registry;
pub use registry::{Axis, AxisRegistry, CommandSlots, StateSlots};

mod interfaces;
pub use interfaces::{
    export_command_interfaces, export_state_interfaces, CommandInterface, CommandQuantity,
    StateInterface, StateQuantity,
};

mod mode;
pub use mode::{plan_mode_switch, ControlLevel, ModeChange};

mod metrics;
pub use metrics::CycleMetrics;

mod cycle;
pub use cycle::CycleDeadline;

mod system;
pub use system::{LifecycleState, OdriveSystem, SystemInterface};
