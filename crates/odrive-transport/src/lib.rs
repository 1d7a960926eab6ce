//! odrive-transport: device gateway for ODrive motor controllers
//!
//! This crate defines the blocking [`DeviceGateway`] interface used by the hardware
//! bridge to talk to ODrive controllers, together with the value types that cross it.
//! The default build enables a `mock` backend so that binaries and tests run on any
//! host; the `usb` feature adds the native USB backend built on libusb.

mod types;
pub use types::{
    AxisCommand, AxisState, DeviceHandle, DeviceInfo, ParseSerialError, SerialNumber, Telemetry,
};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::DeviceGateway;

pub mod endpoints;
pub use endpoints::{AxisEndpoints, EndpointMap};

pub mod protocol;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{CallKind, GatewayCall, MockGateway};

#[cfg(feature = "usb")]
mod usb;

#[cfg(feature = "usb")]
pub use usb::UsbGateway;
