use crate::interfaces::{interface_name, split_interface_name, CommandQuantity};
use crate::{AxisRegistry, HardwareError, Result};

/// Which command channel of an axis is authoritative.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ControlLevel {
    #[default]
    Undefined,
    Effort,
    Velocity,
    Position,
}

impl ControlLevel {
    pub fn quantity(self) -> Option<CommandQuantity> {
        match self {
            ControlLevel::Undefined => None,
            ControlLevel::Effort => Some(CommandQuantity::Effort),
            ControlLevel::Velocity => Some(CommandQuantity::Velocity),
            ControlLevel::Position => Some(CommandQuantity::Position),
        }
    }

    pub fn from_quantity(quantity: CommandQuantity) -> Self {
        match quantity {
            CommandQuantity::Effort => ControlLevel::Effort,
            CommandQuantity::Velocity => ControlLevel::Velocity,
            CommandQuantity::Position => ControlLevel::Position,
        }
    }
}

/// A pending transition of one axis.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ModeChange {
    pub axis: usize,
    pub from: ControlLevel,
    pub to: ControlLevel,
}

#[derive(Clone, Copy, Default)]
struct Claims {
    starting: [bool; 3],
    stopping: [bool; 3],
}

impl Claims {
    fn starting(&self) -> impl Iterator<Item = CommandQuantity> + '_ {
        CommandQuantity::ALL
            .into_iter()
            .filter(|q| self.starting[q.index()])
    }

    fn is_empty(&self) -> bool {
        !self.starting.iter().chain(self.stopping.iter()).any(|b| *b)
    }
}

/// Work out the transitions implied by a controller switch without applying them.
///
/// Interface names of joints that are not in `registry` are ignored, as are state or
/// unknown quantities of known joints. Fails with [`HardwareError::ModeConflict`] if any
/// axis would end up with more than one claimed command channel; in that case no
/// transition of the request should be applied.
pub fn plan_mode_switch(
    registry: &AxisRegistry,
    start: &[String],
    stop: &[String],
) -> Result<Vec<ModeChange>> {
    let mut claims = vec![Claims::default(); registry.len()];
    for (names, starting) in [(start, true), (stop, false)] {
        for name in names {
            let Some((joint, quantity)) = split_interface_name(name) else {
                continue;
            };
            let (Some(idx), Some(q)) = (registry.index_of(joint), CommandQuantity::parse(quantity))
            else {
                continue;
            };
            if starting {
                claims[idx].starting[q.index()] = true;
            } else {
                claims[idx].stopping[q.index()] = true;
            }
        }
    }

    let mut changes = Vec::new();
    for (idx, (axis, claim)) in registry.iter().zip(&claims).enumerate() {
        if claim.is_empty() {
            continue;
        }
        let current = axis.control_level();
        let held = current.quantity();
        let held_released = held.map_or(false, |q| claim.stopping[q.index()]);

        let starting: Vec<CommandQuantity> = claim.starting().collect();
        let next = match starting.as_slice() {
            [] if held_released => ControlLevel::Undefined,
            [] => current,
            [q] => match held {
                Some(h) if h != *q && !held_released => {
                    return Err(conflict(&axis.name, &[h, *q]));
                }
                _ => ControlLevel::from_quantity(*q),
            },
            many => return Err(conflict(&axis.name, many)),
        };
        if next != current {
            changes.push(ModeChange {
                axis: idx,
                from: current,
                to: next,
            });
        }
    }
    Ok(changes)
}

fn conflict(joint: &str, quantities: &[CommandQuantity]) -> HardwareError {
    HardwareError::ModeConflict {
        joint: joint.to_string(),
        claimed: quantities
            .iter()
            .map(|q| interface_name(joint, q.as_str()))
            .collect(),
    }
}

pub(crate) fn apply_mode_changes(registry: &mut AxisRegistry, changes: &[ModeChange]) {
    let axes = registry.axes_mut();
    for change in changes {
        if let Some(axis) = axes.get_mut(change.axis) {
            axis.set_control_level(change.to);
        }
    }
}
