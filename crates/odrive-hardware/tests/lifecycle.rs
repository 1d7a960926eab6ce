//! Full lifecycles of `OdriveSystem` against the mock gateway.

use odrive_hardware::{
    parse_hardware_info, CommandInterface, ControlLevel, HardwareError, HardwareInfo,
    LifecycleState, OdriveSystem, StateInterface, SystemInterface,
};
use odrive_transport::{
    AxisCommand, AxisState, CallKind, GatewayCall, MockGateway, SerialNumber, Telemetry,
    TransportError,
};
use std::f64::consts::TAU;
use std::time::Duration;
use time::OffsetDateTime;

const BASE: SerialNumber = SerialNumber::new(0x2087_3597_524B);
const LIFT: SerialNumber = SerialNumber::new(0x3061_4E4F_1234);
const PERIOD: Duration = Duration::from_millis(100);

const CONFIG: &str = r#"
name: rover
joints:
  - name: left_wheel
    parameters:
      serial_number: "20873597524B"
      axis: "0"
      torque_constant: "0.05"
  - name: right_wheel
    parameters:
      serial_number: "20873597524B"
      axis: "1"
      torque_constant: "0.05"
      enable_watchdog: "true"
  - name: lift
    parameters:
      serial_number: "3061:4E4F1234"
      axis: "0"
      torque_constant: "0.1"
"#;

fn hardware_info() -> HardwareInfo {
    parse_hardware_info(CONFIG).unwrap()
}

fn mock() -> MockGateway {
    MockGateway::new().with_device(BASE).with_device(LIFT)
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Configured and active system plus its exported channels.
fn active_system() -> (
    OdriveSystem<MockGateway>,
    Vec<StateInterface>,
    Vec<CommandInterface>,
) {
    let mut sys = OdriveSystem::new(mock()).unwrap();
    sys.on_init(&hardware_info()).unwrap();
    let states = sys.export_state_interfaces();
    let commands = sys.export_command_interfaces();
    sys.on_activate(LifecycleState::Inactive).unwrap();
    sys.gateway_mut().clear_calls();
    (sys, states, commands)
}

fn command<'a>(commands: &'a [CommandInterface], name: &str) -> &'a CommandInterface {
    commands.iter().find(|c| c.name() == name).unwrap()
}

fn state<'a>(states: &'a [StateInterface], name: &str) -> &'a StateInterface {
    states.iter().find(|s| s.name() == name).unwrap()
}

fn sent_commands(gw: &MockGateway) -> Vec<&GatewayCall> {
    gw.calls()
        .iter()
        .filter(|c| c.kind() == CallKind::SendCommand)
        .collect()
}

#[test]
fn test_velocity_command_reaches_axis_in_turns() {
    let (mut sys, _, commands) = active_system();
    sys.prepare_command_mode_switch(&names(&["left_wheel/velocity"]), &[])
        .unwrap();
    command(&commands, "left_wheel/velocity").set(2.0);

    sys.read(now(), PERIOD).unwrap();
    sys.write(now(), PERIOD).unwrap();

    let sent = sys.gateway().last_command(BASE, 0).unwrap();
    let AxisCommand::Velocity(turns) = sent else {
        panic!("expected velocity command, got {sent:?}");
    };
    assert!((f64::from(turns) - 2.0 / TAU).abs() < 1e-6);
    // only the claimed axis was commanded
    assert_eq!(sent_commands(sys.gateway()).len(), 1);
}

#[test]
fn test_effort_command_becomes_current() {
    let (mut sys, _, commands) = active_system();
    sys.prepare_command_mode_switch(&names(&["left_wheel/effort"]), &[])
        .unwrap();
    command(&commands, "left_wheel/effort").set(1.0);

    sys.read(now(), PERIOD).unwrap();
    sys.write(now(), PERIOD).unwrap();
    assert_eq!(
        sys.gateway().last_command(BASE, 0),
        Some(AxisCommand::Current(20.0))
    );

    // the mock reports the commanded current back; effort follows it
    sys.read(now(), PERIOD).unwrap();
    let states = sys.export_state_interfaces();
    assert!((state(&states, "left_wheel/effort").get() - 1.0).abs() < 1e-6);
}

#[test]
fn test_position_command_and_state_conversion() {
    let (mut sys, states, commands) = active_system();
    sys.prepare_command_mode_switch(&names(&["lift/position"]), &[])
        .unwrap();
    command(&commands, "lift/position").set(TAU * 1.5);
    sys.read(now(), PERIOD).unwrap();
    sys.write(now(), PERIOD).unwrap();
    assert_eq!(
        sys.gateway().last_command(LIFT, 0),
        Some(AxisCommand::Position(1.5))
    );

    sys.read(now(), PERIOD).unwrap();
    assert!((state(&states, "lift/position").get() - TAU * 1.5).abs() < 1e-5);
    assert_eq!(state(&states, "lift/vbus_voltage").get(), 24.0);
}

#[test]
fn test_watchdog_fed_only_where_enabled() {
    let (mut sys, _, _) = active_system();
    for _ in 0..3 {
        sys.read(now(), PERIOD).unwrap();
        sys.write(now(), PERIOD).unwrap();
    }
    let gw = sys.gateway();
    // fed every cycle even without a claimed command channel
    assert_eq!(gw.watchdog_feeds(BASE, 1), 3);
    assert_eq!(gw.watchdog_feeds(BASE, 0), 0);
    assert_eq!(gw.watchdog_feeds(LIFT, 0), 0);
    assert!(sent_commands(gw).is_empty());
}

#[test]
fn test_mode_follows_claims_through_system() {
    let (mut sys, _, _) = active_system();
    let level = |sys: &OdriveSystem<MockGateway>| sys.registry().get("lift").unwrap().control_level();
    assert_eq!(level(&sys), ControlLevel::Undefined);

    sys.prepare_command_mode_switch(&names(&["lift/effort"]), &[])
        .unwrap();
    assert_eq!(level(&sys), ControlLevel::Effort);

    let err = sys
        .prepare_command_mode_switch(&names(&["lift/position", "lift/velocity"]), &names(&["lift/effort"]))
        .unwrap_err();
    assert!(matches!(err, HardwareError::ModeConflict { .. }));
    assert_eq!(level(&sys), ControlLevel::Effort);

    sys.prepare_command_mode_switch(&[], &names(&["lift/effort"]))
        .unwrap();
    assert_eq!(level(&sys), ControlLevel::Undefined);
    assert!(sys.gateway().calls().is_empty());
}

#[test]
fn test_partial_read_failure_keeps_earlier_axes_and_blocks_write() {
    let (mut sys, states, commands) = active_system();
    sys.prepare_command_mode_switch(&names(&["left_wheel/velocity"]), &[])
        .unwrap();
    command(&commands, "left_wheel/velocity").set(1.0);

    let sample = Telemetry {
        position: 0.25,
        bus_voltage: 23.5,
        ..Telemetry::default()
    };
    for (serial, axis) in [(BASE, 0), (BASE, 1), (LIFT, 0)] {
        sys.gateway_mut().set_telemetry(serial, axis, sample);
    }
    sys.gateway_mut().inject_fault_once(
        CallKind::ReadTelemetry,
        Some(LIFT),
        Some(0),
        TransportError::Pipe,
    );

    let err = sys.read(now(), PERIOD).unwrap_err();
    match &err {
        HardwareError::Transport { joint, source } => {
            assert_eq!(joint, "lift");
            assert_eq!(source.name(), "LIBUSB_ERROR_PIPE");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!((state(&states, "left_wheel/position").get() - TAU / 4.0).abs() < 1e-6);
    assert!((state(&states, "right_wheel/position").get() - TAU / 4.0).abs() < 1e-6);
    assert_eq!(state(&states, "lift/position").get(), 0.0);

    sys.gateway_mut().clear_calls();
    assert!(matches!(
        sys.write(now(), PERIOD),
        Err(HardwareError::CycleAborted)
    ));
    assert!(sys.gateway().calls().is_empty());

    // next cycle recovers
    sys.read(now(), PERIOD).unwrap();
    sys.write(now(), PERIOD).unwrap();
    assert_eq!(sent_commands(sys.gateway()).len(), 1);
    assert_eq!(sys.gateway().watchdog_feeds(BASE, 1), 1);
}

#[test]
fn test_write_failure_stops_remaining_axes() {
    let (mut sys, _, commands) = active_system();
    sys.prepare_command_mode_switch(&names(&["left_wheel/velocity", "lift/velocity"]), &[])
        .unwrap();
    command(&commands, "left_wheel/velocity").set(1.0);
    command(&commands, "lift/velocity").set(1.0);
    sys.gateway_mut().inject_fault(
        CallKind::SendCommand,
        Some(BASE),
        Some(0),
        TransportError::Io,
    );

    sys.read(now(), PERIOD).unwrap();
    let err = sys.write(now(), PERIOD).unwrap_err();
    assert_eq!(err.transport(), Some(&TransportError::Io));
    assert_eq!(sys.gateway().last_command(LIFT, 0), None);
    assert_eq!(sys.gateway().watchdog_feeds(BASE, 1), 0);
    assert_eq!(sys.metrics().transport_failures.get(), 1);
}

#[test]
fn test_unreachable_device_releases_opened_connections() {
    let mut sys = OdriveSystem::new(MockGateway::new().with_device(BASE)).unwrap();
    sys.on_init(&hardware_info()).unwrap();

    let err = sys.on_activate(LifecycleState::Inactive).unwrap_err();
    match err {
        HardwareError::Connection { serial, source } => {
            assert_eq!(serial, LIFT);
            assert_eq!(source.name(), "LIBUSB_ERROR_NO_DEVICE");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(sys.state(), LifecycleState::Inactive);
    assert!(!sys.gateway().is_connected(BASE));
    assert_eq!(sys.gateway().count_calls(CallKind::Release), 1);
    assert_eq!(sys.gateway().count_calls(CallKind::SetAxisState), 0);
}

#[test]
fn test_closed_loop_failure_rolls_back_activation() {
    let mut sys = OdriveSystem::new(mock()).unwrap();
    sys.on_init(&hardware_info()).unwrap();
    sys.gateway_mut().inject_fault_once(
        CallKind::SetAxisState,
        Some(LIFT),
        None,
        TransportError::Timeout,
    );

    let err = sys.on_activate(LifecycleState::Inactive).unwrap_err();
    assert!(matches!(err, HardwareError::Transport { ref joint, .. } if joint == "lift"));
    assert_eq!(sys.state(), LifecycleState::Inactive);
    assert_eq!(sys.gateway().axis_state(BASE, 0), Some(AxisState::Idle));
    assert_eq!(sys.gateway().axis_state(BASE, 1), Some(AxisState::Idle));
    assert!(!sys.gateway().is_connected(BASE));
    assert!(!sys.gateway().is_connected(LIFT));

    // a later attempt succeeds
    sys.on_activate(LifecycleState::Inactive).unwrap();
    assert_eq!(
        sys.gateway().axis_state(LIFT, 0),
        Some(AxisState::ClosedLoopControl)
    );
}

#[test]
fn test_deactivate_is_best_effort() {
    let (mut sys, _, _) = active_system();
    sys.gateway_mut().inject_fault(
        CallKind::SetAxisState,
        Some(BASE),
        Some(0),
        TransportError::NoDevice("gone".into()),
    );

    let err = sys.on_deactivate(LifecycleState::Active).unwrap_err();
    assert!(matches!(err, HardwareError::Transport { ref joint, .. } if joint == "left_wheel"));
    assert_eq!(sys.state(), LifecycleState::Inactive);

    let gw = sys.gateway();
    assert_eq!(gw.axis_state(BASE, 1), Some(AxisState::Idle));
    assert_eq!(gw.axis_state(LIFT, 0), Some(AxisState::Idle));
    assert_eq!(gw.count_calls(CallKind::SetAxisState), 3);
    assert_eq!(gw.count_calls(CallKind::Release), 2);
    assert!(!gw.is_connected(BASE));
    assert!(!gw.is_connected(LIFT));

    assert!(matches!(
        sys.read(now(), PERIOD),
        Err(HardwareError::InvalidLifecycle { .. })
    ));
}

#[test]
fn test_deadline_miss_is_transport_timeout() {
    let (mut sys, _, _) = active_system();
    let err = sys.read(now(), Duration::from_nanos(1)).unwrap_err();
    assert_eq!(err.transport(), Some(&TransportError::Timeout));
    assert!(sys.metrics().deadline_misses.get() >= 1);
    assert!(sys.metrics().encode_text().contains("odrive_deadline_misses_total"));
}

#[test]
fn test_device_errors_are_state_not_failures() {
    let (mut sys, states, _) = active_system();
    sys.gateway_mut().set_telemetry(
        BASE,
        1,
        Telemetry {
            axis_error: 0x100,
            encoder_error: 0x4,
            ..Telemetry::default()
        },
    );
    sys.read(now(), PERIOD).unwrap();
    assert_eq!(state(&states, "right_wheel/axis_error").get(), 256.0);
    assert_eq!(state(&states, "right_wheel/encoder_error").get(), 4.0);
    assert_eq!(sys.metrics().reads.get(), 1);
}
