use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::fs;
use std::thread;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tracing::{info, warn};

use odrive_hardware::{
    load_hardware_info_file, HardwareInfo, LifecycleState, OdriveSystem, StateInterface,
    SystemInterface,
};
use odrive_transport::{DeviceGateway, EndpointMap, MockGateway};

const DEFAULT_USB_TIMEOUT_MS: u64 = 10;

#[derive(Parser, Debug)]
#[command(
    name = "odrive",
    version,
    about = "ODrive hardware bridge CLI",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Backend {
    Mock,
    Usb,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CmdMode {
    Position,
    Velocity,
    Effort,
}

impl CmdMode {
    fn as_str(self) -> &'static str {
        match self {
            CmdMode::Position => "position",
            CmdMode::Velocity => "velocity",
            CmdMode::Effort => "effort",
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List ODrive controllers visible to a backend
    List {
        #[arg(long, value_enum, default_value_t = Backend::Mock)]
        backend: Backend,
        /// Hardware description; the mock backend lists its controllers
        #[arg(long)]
        config: Option<String>,
    },
    /// Validate a hardware description
    Validate {
        #[arg(long)]
        config: String,
        /// Print the parsed description as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Print the state and command interfaces a hardware description exports
    Interfaces {
        #[arg(long)]
        config: String,
    },
    /// Command one joint in a fixed-rate read/write loop
    Run {
        #[arg(long)]
        config: String,
        /// Joint to command
        #[arg(long)]
        joint: String,
        #[arg(long, value_enum, default_value = "velocity")]
        mode: CmdMode,
        /// Setpoint in rad, rad/s or N·m depending on mode
        #[arg(long, default_value_t = 0.0)]
        value: f64,
        #[arg(long, default_value_t = 100.0)]
        rate_hz: f64,
        /// Number of cycles to run
        #[arg(long, default_value_t = 500u32)]
        cycles: u32,
        #[arg(long, value_enum, default_value_t = Backend::Mock)]
        backend: Backend,
        /// Endpoint map YAML (required for the usb backend)
        #[arg(long)]
        endpoints: Option<String>,
        /// Stop after this many consecutive failed cycles
        #[arg(long, default_value_t = 10u32)]
        max_failures: u32,
        /// Print joint state every N cycles (0 = never)
        #[arg(long, default_value_t = 50u32)]
        print_every: u32,
        /// Dump cycle metrics in Prometheus text format on exit
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::List { backend, config } => list(backend, config.as_deref()),
        Commands::Validate { config, json } => validate(&config, json),
        Commands::Interfaces { config } => interfaces(&config),
        Commands::Run {
            config,
            joint,
            mode,
            value,
            rate_hz,
            cycles,
            backend,
            endpoints,
            max_failures,
            print_every,
            metrics,
        } => run(RunArgs {
            config: &config,
            joint: &joint,
            mode,
            value,
            rate_hz,
            cycles,
            backend,
            endpoints: endpoints.as_deref(),
            max_failures,
            print_every,
            metrics,
        }),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn load_endpoints(path: &str) -> Result<EndpointMap> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading endpoint map: {path}"))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parsing endpoint map: {path}"))
}

fn mock_gateway(info: Option<&HardwareInfo>) -> Result<MockGateway> {
    let mut gw = MockGateway::new();
    if let Some(info) = info {
        for joint in info.joint_configs()? {
            gw.add_device(joint.serial_number);
        }
    }
    Ok(gw)
}

#[cfg(feature = "usb")]
fn usb_gateway(endpoints: EndpointMap, timeout: Duration) -> Result<Box<dyn DeviceGateway>> {
    Ok(Box::new(odrive_transport::UsbGateway::new(endpoints, timeout)))
}

#[cfg(not(feature = "usb"))]
fn usb_gateway(_endpoints: EndpointMap, _timeout: Duration) -> Result<Box<dyn DeviceGateway>> {
    Err(anyhow::anyhow!(
        "usb backend not available: rebuild odrive-cli with --features usb"
    ))
}

fn usb_timeout(info: Option<&HardwareInfo>) -> Result<Duration> {
    let configured = match info {
        Some(info) => info.usb_timeout()?,
        None => None,
    };
    Ok(configured.unwrap_or(Duration::from_millis(DEFAULT_USB_TIMEOUT_MS)))
}

fn list(backend: Backend, config: Option<&str>) -> Result<()> {
    let info = config.map(load_hardware_info_file).transpose()?;
    let mut gateway: Box<dyn DeviceGateway> = match backend {
        Backend::Mock => Box::new(mock_gateway(info.as_ref())?),
        Backend::Usb => usb_gateway(EndpointMap::default(), usb_timeout(info.as_ref())?)?,
    };
    let devices = gateway.list()?;
    if devices.is_empty() {
        eprintln!("no ODrive controllers found ({backend:?})");
    }
    for dev in devices {
        println!("{}\t{}", dev.serial, dev.driver);
    }
    Ok(())
}

fn validate(config: &str, json: bool) -> Result<()> {
    let info = load_hardware_info_file(config)?;
    let joints = info.joint_configs()?;
    info.usb_timeout()?;
    let mut serials: Vec<_> = joints.iter().map(|j| j.serial_number).collect();
    serials.sort();
    serials.dedup();
    println!(
        "ok: {} ({} joints, {} controllers)",
        info.name,
        joints.len(),
        serials.len()
    );
    for j in &joints {
        println!(
            "  {}\tserial={}\taxis={}\tkt={}\twatchdog={}",
            j.name, j.serial_number, j.axis, j.torque_constant, j.enable_watchdog
        );
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    }
    Ok(())
}

fn interfaces(config: &str) -> Result<()> {
    let info = load_hardware_info_file(config)?;
    let mut system = OdriveSystem::new(MockGateway::new())?;
    system.on_init(&info)?;
    for s in system.export_state_interfaces() {
        println!("state\t{}", s.name());
    }
    for c in system.export_command_interfaces() {
        println!("command\t{}", c.name());
    }
    Ok(())
}

struct RunArgs<'a> {
    config: &'a str,
    joint: &'a str,
    mode: CmdMode,
    value: f64,
    rate_hz: f64,
    cycles: u32,
    backend: Backend,
    endpoints: Option<&'a str>,
    max_failures: u32,
    print_every: u32,
    metrics: bool,
}

fn print_joint(cycle: u32, states: &[StateInterface], joint: &str) {
    let fields: Vec<String> = states
        .iter()
        .filter(|s| s.joint() == joint)
        .map(|s| format!("{}={:.4}", s.quantity(), s.get()))
        .collect();
    println!("cycle={cycle}\t{joint}\t{}", fields.join(" "));
}

fn run(args: RunArgs<'_>) -> Result<()> {
    anyhow::ensure!(
        args.rate_hz.is_finite() && args.rate_hz > 0.0,
        "rate must be a positive number of Hz"
    );
    let info = load_hardware_info_file(args.config)?;
    let gateway: Box<dyn DeviceGateway> = match args.backend {
        Backend::Mock => Box::new(mock_gateway(Some(&info))?),
        Backend::Usb => {
            let path = args
                .endpoints
                .ok_or_else(|| anyhow::anyhow!("--endpoints is required for the usb backend"))?;
            usb_gateway(load_endpoints(path)?, usb_timeout(Some(&info))?)?
        }
    };

    let mut system = OdriveSystem::new(gateway)?;
    system.on_init(&info)?;
    let states = system.export_state_interfaces();
    let commands = system.export_command_interfaces();
    let name = format!("{}/{}", args.joint, args.mode.as_str());
    let command = commands
        .iter()
        .find(|c| c.name() == name)
        .ok_or_else(|| anyhow::anyhow!("unknown command interface: {name}"))?;
    system.prepare_command_mode_switch(&[name.clone()], &[])?;
    command.set(args.value);

    system.on_activate(LifecycleState::Inactive)?;
    let period = Duration::from_secs_f64(1.0 / args.rate_hz);
    info!(
        interface = %name,
        value = args.value,
        rate_hz = args.rate_hz,
        cycles = args.cycles,
        "control loop started"
    );

    let outcome = control_loop(&mut system, &states, &args, period);
    let teardown = system.on_deactivate(LifecycleState::Active);
    if args.metrics {
        print!("{}", system.metrics().encode_text());
    }
    outcome?;
    teardown?;
    Ok(())
}

fn control_loop<G: DeviceGateway>(
    system: &mut OdriveSystem<G>,
    states: &[StateInterface],
    args: &RunArgs<'_>,
    period: Duration,
) -> Result<()> {
    let mut consecutive_failures = 0u32;
    let mut next = Instant::now();
    for cycle in 0..args.cycles {
        let result = system
            .read(OffsetDateTime::now_utc(), period)
            .and_then(|_| system.write(OffsetDateTime::now_utc(), period));
        match result {
            Ok(()) => consecutive_failures = 0,
            Err(e) => {
                consecutive_failures += 1;
                warn!(cycle, consecutive_failures, "cycle failed: {e}");
                if consecutive_failures >= args.max_failures {
                    return Err(anyhow::Error::new(e).context(format!(
                        "giving up after {consecutive_failures} consecutive failed cycles"
                    )));
                }
            }
        }
        if args.print_every > 0 && cycle % args.print_every == 0 {
            print_joint(cycle, states, args.joint);
        }
        next += period;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            next = now;
        }
    }
    info!(cycles = args.cycles, "control loop finished");
    Ok(())
}
