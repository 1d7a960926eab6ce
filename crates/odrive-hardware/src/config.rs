use crate::ConfigError;
use anyhow::Context;
use odrive_transport::SerialNumber;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Static description of one hardware component and its joints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardwareInfo {
    pub name: String,
    #[serde(default)]
    pub hardware_parameters: BTreeMap<String, ParamValue>,
    #[serde(default)]
    pub joints: Vec<JointInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointInfo {
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

/// Validated per-joint options.
#[derive(Debug, Clone, PartialEq)]
pub struct JointConfig {
    pub name: String,
    pub serial_number: SerialNumber,
    pub axis: u8,
    /// N·m per A.
    pub torque_constant: f64,
    pub enable_watchdog: bool,
}

impl JointConfig {
    pub fn from_info(info: &JointInfo) -> Result<Self, ConfigError> {
        let joint = info.name.as_str();
        let serial_number = match required(info, "serial_number")? {
            ParamValue::Text(s) => s
                .parse()
                .map_err(|_| invalid(joint, "serial_number", s, "expected hex or HIGH:LOW"))?,
            other => {
                return Err(invalid(
                    joint,
                    "serial_number",
                    &other.to_string(),
                    "serial numbers must be quoted strings",
                ))
            }
        };
        let axis = match required(info, "axis")? {
            ParamValue::Int(i @ 0..=1) => *i as u8,
            ParamValue::Text(s) if s.trim() == "0" => 0,
            ParamValue::Text(s) if s.trim() == "1" => 1,
            other => return Err(invalid(joint, "axis", &other.to_string(), "expected 0 or 1")),
        };
        let raw_kt = required(info, "torque_constant")?;
        let torque_constant = match raw_kt {
            ParamValue::Float(x) => *x,
            ParamValue::Int(i) => *i as f64,
            ParamValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| invalid(joint, "torque_constant", s, "expected a number"))?,
            ParamValue::Bool(_) => {
                return Err(invalid(joint, "torque_constant", &raw_kt.to_string(), "expected a number"))
            }
        };
        if !torque_constant.is_finite() || torque_constant == 0.0 {
            return Err(invalid(
                joint,
                "torque_constant",
                &raw_kt.to_string(),
                "must be finite and non-zero",
            ));
        }
        let enable_watchdog = match info.parameters.get("enable_watchdog") {
            None => false,
            Some(ParamValue::Bool(b)) => *b,
            Some(ParamValue::Int(0)) => false,
            Some(ParamValue::Int(1)) => true,
            Some(ParamValue::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return Err(invalid(joint, "enable_watchdog", s, "expected a boolean")),
            },
            Some(other) => {
                return Err(invalid(
                    joint,
                    "enable_watchdog",
                    &other.to_string(),
                    "expected a boolean",
                ))
            }
        };
        Ok(Self {
            name: info.name.clone(),
            serial_number,
            axis,
            torque_constant,
            enable_watchdog,
        })
    }
}

fn required<'a>(info: &'a JointInfo, param: &'static str) -> Result<&'a ParamValue, ConfigError> {
    info.parameters
        .get(param)
        .ok_or_else(|| ConfigError::MissingParameter {
            joint: info.name.clone(),
            param,
        })
}

fn invalid(joint: &str, param: &'static str, value: &str, reason: &'static str) -> ConfigError {
    ConfigError::InvalidParameter {
        joint: joint.to_string(),
        param,
        value: value.to_string(),
        reason,
    }
}

impl HardwareInfo {
    /// Validate every joint, in declaration order.
    pub fn joint_configs(&self) -> Result<Vec<JointConfig>, ConfigError> {
        if self.joints.is_empty() {
            return Err(ConfigError::NoJoints);
        }
        let mut names = HashSet::new();
        let mut out: Vec<JointConfig> = Vec::with_capacity(self.joints.len());
        for info in &self.joints {
            if info.name.trim().is_empty() || info.name.contains('/') {
                return Err(ConfigError::InvalidJointName(info.name.clone()));
            }
            if !names.insert(info.name.as_str()) {
                return Err(ConfigError::DuplicateJoint(info.name.clone()));
            }
            let cfg = JointConfig::from_info(info)?;
            if let Some(prev) = out
                .iter()
                .find(|c| c.serial_number == cfg.serial_number && c.axis == cfg.axis)
            {
                return Err(ConfigError::DuplicateAxis {
                    first: prev.name.clone(),
                    second: cfg.name,
                    serial: cfg.serial_number,
                    axis: cfg.axis,
                });
            }
            out.push(cfg);
        }
        Ok(out)
    }

    /// Per-transfer timeout for the USB backend (`usb_timeout_ms`).
    pub fn usb_timeout(&self) -> Result<Option<Duration>, ConfigError> {
        let Some(value) = self.hardware_parameters.get("usb_timeout_ms") else {
            return Ok(None);
        };
        let ms = match value {
            ParamValue::Int(i) if *i > 0 => *i as u64,
            ParamValue::Text(s) => s
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| ConfigError::InvalidHardwareParameter {
                    param: "usb_timeout_ms",
                    value: s.clone(),
                })?,
            other => {
                return Err(ConfigError::InvalidHardwareParameter {
                    param: "usb_timeout_ms",
                    value: other.to_string(),
                })
            }
        };
        Ok(Some(Duration::from_millis(ms)))
    }
}

pub fn parse_hardware_info(yaml: &str) -> Result<HardwareInfo, serde_yaml::Error> {
    serde_yaml::from_str(yaml)
}

pub fn load_hardware_info_file(path: impl AsRef<Path>) -> anyhow::Result<HardwareInfo> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading hardware description: {}", path.display()))?;
    parse_hardware_info(&raw)
        .with_context(|| format!("parsing hardware description: {}", path.display()))
}
