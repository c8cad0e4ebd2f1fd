//! Inbound notifications and outbound commands of the lifecycle controller.

use crate::config::Credentials;
use crate::protocol::SensorReport;
use std::fmt;
use std::net::Ipv4Addr;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No join in progress; waiting for the driver or the button.
    Disconnected,
    /// Join requested, waiting for the driver.
    Connecting,
    /// Associated with the access point.
    Connected,
    /// Advertising the configuration access point.
    Provisioning,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Provisioning => "provisioning",
        };
        write!(f, "{}", name)
    }
}

/// Link state carried by a connection-changed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Down,
}

/// Why resuming the stored network failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeFailure {
    /// No stored network is visible in the scan.
    NoMatchingNetwork,
    /// Nothing is stored, or no access point is around at all.
    NoStoredNetwork,
    /// Any other driver error code.
    Other(i8),
}

/// Outcome of the external provisioning flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionResult {
    Success(Credentials),
    Failed(String),
}

/// Notification from the radio driver or the socket layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// Association with the access point changed.
    ConnectionChanged(LinkState),
    /// Resuming the stored network did not succeed.
    ResumeFailed(ResumeFailure),
    /// Details of the joined network.
    ConnectionInfo { ssid: String },
    /// DHCP finished.
    AddressAssigned(Ipv4Addr),
    /// The provisioning flow finished.
    Provisioned(ProvisionResult),
    /// The collection server pushed a report for this device.
    RemoteReport(SensorReport),
}

/// Action the controller asks its environment to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Rejoin whatever network the driver has stored.
    ResumeStoredNetwork,
    /// Join a network with the given credentials.
    Connect(Credentials),
    /// Ask the driver for details of the joined network.
    RequestConnectionInfo,
    /// Start DHCP.
    RequestAddress,
    /// Start advertising the configuration access point.
    StartProvisioning,
    /// Tear down the configuration access point.
    StopProvisioning,
    /// Print the credential prompt and read one console line.
    PromptCredentials,
    /// Drive the status LED.
    SetLed(bool),
    /// Send a keepalive followed by a sensor report.
    SendReport { led_on: bool },
}
