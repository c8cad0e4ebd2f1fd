//! IoT sensor node firmware library.
//!
//! A WiFi temperature sensor that joins a network (resuming the stored one,
//! or provisioned through a configuration access point or the serial
//! console) and broadcasts periodic UDP reports to a collection server.
//!
//! Everything except the [`wifi`] driver and the ESP32 GPIO peripherals is
//! platform-independent and tested on the host.

pub mod config;
pub mod controller;
pub mod node;
pub mod platform;
pub mod protocol;
pub mod provisioning;
#[cfg(feature = "esp32")]
pub mod wifi;

// Re-export commonly used items
pub use config::{ConfigError, Credentials, NodeConfig, SecurityType};
pub use controller::{Command, ConnectionState, Controller, DriverEvent, Timing};
pub use node::{Board, Node};
pub use platform::{MonotonicClock, PlatformError};
pub use protocol::{KeepaliveRecord, ProductName, ProtocolError, SensorReport};
pub use provisioning::ProvisioningServer;
