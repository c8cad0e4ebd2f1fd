//! Platform abstraction layer.
//!
//! The node talks to its environment only through these traits, so the same
//! loop runs on ESP32 and on the host:
//!
//! - [`RadioDriver`] - WiFi join, DHCP, configuration access point
//! - [`Transport`] - datagram socket to the collection server
//! - [`TemperatureSensor`], [`StatusLed`], [`Button`], [`Console`]
//!
//! Implementations:
//!
//! - [`net`] - UDP transport over `std::net` (host and ESP-IDF)
//! - [`sim`] - simulated radio, sensor and LED for host runs
//! - [`terminal`] - stdin/stdout console and keyboard button
//! - `esp32` - GPIO LED and button (ESP32 only)

#[cfg(feature = "esp32")]
pub mod esp32;
pub mod net;
pub mod sim;
pub mod terminal;

use crate::config::{AccessPointConfig, Credentials};
use crate::controller::DriverEvent;
use std::net::SocketAddrV4;
use std::time::Instant;

/// WiFi radio driver.
///
/// Commands are fire-and-forget; outcomes arrive later through
/// [`RadioDriver::poll_events`].
pub trait RadioDriver {
    /// Bring up the driver. Failure here is fatal.
    fn init(&mut self) -> Result<(), PlatformError>;

    /// Rejoin the network the driver has stored.
    fn resume_stored_network(&mut self) -> Result<(), PlatformError>;

    /// Join a network.
    fn connect(&mut self, credentials: &Credentials) -> Result<(), PlatformError>;

    /// Ask for details of the joined network.
    fn request_connection_info(&mut self) -> Result<(), PlatformError>;

    /// Start DHCP.
    fn request_address(&mut self) -> Result<(), PlatformError>;

    /// Advertise the configuration access point and serve the provisioning
    /// page. Returns the address the page is reachable on.
    fn start_provisioning(
        &mut self,
        access_point: &AccessPointConfig,
    ) -> Result<SocketAddrV4, PlatformError>;

    /// Tear down the configuration access point.
    fn stop_provisioning(&mut self) -> Result<(), PlatformError>;

    /// Drain pending notifications.
    fn poll_events(&mut self) -> Vec<DriverEvent>;
}

/// Datagram transport to the collection server.
pub trait Transport {
    /// Create the sockets. Called lazily before the first send.
    fn open(&mut self) -> Result<(), PlatformError>;

    fn is_open(&self) -> bool;

    /// Send one datagram to the server.
    fn send(&mut self, datagram: &[u8]) -> Result<(), PlatformError>;

    /// Receive one datagram without blocking.
    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>, PlatformError>;
}

pub trait TemperatureSensor {
    /// Current temperature in degrees Celsius.
    fn read_celsius(&mut self) -> Result<f32, PlatformError>;
}

pub trait StatusLed {
    fn set(&mut self, on: bool);
}

pub trait Button {
    /// Current level, true while held down.
    fn is_pressed(&mut self) -> bool;
}

/// Serial console.
pub trait Console {
    fn write_line(&mut self, line: &str);

    /// Block until one line is entered.
    fn read_line(&mut self) -> Result<String, PlatformError>;
}

/// Millisecond counter since creation, wrapping at `u32::MAX`.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u32 {
        // Truncation gives the wrapping counter.
        self.start.elapsed().as_millis() as u32
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Platform errors.
#[derive(Debug)]
pub enum PlatformError {
    /// Radio driver reported an error.
    Radio(String),
    /// Sensor could not be read.
    Sensor(String),
    /// Transport used before [`Transport::open`].
    NotOpen,
    /// Console input ended.
    ConsoleClosed,
    /// Generic I/O error.
    Io(std::io::Error),
}

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Radio(msg) => write!(f, "radio error: {}", msg),
            Self::Sensor(msg) => write!(f, "sensor error: {}", msg),
            Self::NotOpen => write!(f, "transport not open"),
            Self::ConsoleClosed => write!(f, "console closed"),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for PlatformError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PlatformError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for PlatformError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Radio(format!("ESP error: {:?}", e))
    }
}
