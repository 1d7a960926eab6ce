//! Conversions between framework units (radians, N·m) and device units (turns, A).

use std::f64::consts::TAU;

pub const RADIANS_PER_TURN: f64 = TAU;

pub fn turns_to_radians(turns: f64) -> f64 {
    turns * RADIANS_PER_TURN
}

pub fn radians_to_turns(radians: f64) -> f64 {
    radians / RADIANS_PER_TURN
}

/// `torque_constant` is in N·m per A and is validated non-zero at configuration time.
pub fn effort_to_current(effort: f64, torque_constant: f64) -> f64 {
    effort / torque_constant
}

pub fn current_to_effort(current: f64, torque_constant: f64) -> f64 {
    current * torque_constant
}
