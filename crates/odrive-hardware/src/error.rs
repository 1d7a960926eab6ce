use crate::LifecycleState;
use odrive_transport::{SerialNumber, TransportError};
use thiserror::Error;

pub type Result<T, E = HardwareError> = core::result::Result<T, E>;

/// Invalid or colliding hardware description.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("no joints configured")]
    NoJoints,
    #[error("invalid joint name {0:?}")]
    InvalidJointName(String),
    #[error("duplicate joint name: {0}")]
    DuplicateJoint(String),
    #[error("joint {joint}: missing parameter `{param}`")]
    MissingParameter { joint: String, param: &'static str },
    #[error("joint {joint}: invalid value {value:?} for `{param}`: {reason}")]
    InvalidParameter {
        joint: String,
        param: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("joints {first} and {second} both map to ODrive {serial} axis {axis}")]
    DuplicateAxis {
        first: String,
        second: String,
        serial: SerialNumber,
        axis: u8,
    },
    #[error("hardware parameter `{param}`: invalid value {value:?}")]
    InvalidHardwareParameter { param: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("cannot connect to ODrive {serial}: {source}")]
    Connection {
        serial: SerialNumber,
        #[source]
        source: TransportError,
    },
    #[error("joint {joint}: conflicting command interfaces claimed: {claimed:?}")]
    ModeConflict { joint: String, claimed: Vec<String> },
    #[error("joint {joint}: transport failure: {source}")]
    Transport {
        joint: String,
        #[source]
        source: TransportError,
    },
    #[error("{operation} not allowed in state {state:?}")]
    InvalidLifecycle {
        operation: &'static str,
        state: LifecycleState,
    },
    #[error("write skipped: telemetry read failed this cycle")]
    CycleAborted,
    #[error("metrics init error: {0}")]
    Metrics(String),
}

impl HardwareError {
    /// Transport-layer error behind this failure, if any.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            HardwareError::Connection { source, .. } | HardwareError::Transport { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}
