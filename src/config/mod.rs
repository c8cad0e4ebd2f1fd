//! Node configuration.
//!
//! # Components
//!
//! - [`wifi`] - credentials, security types and console-line parsing
//! - [`NodeConfig`] - ports, product name, timing and the configuration
//!   access point
//!
//! Defaults are compiled in. The host binary can override a few of them
//! through environment variables, see [`NodeConfig::apply_env`].

mod wifi;

pub use wifi::{
    ConfigError, Credentials, SecurityType, CHANNEL_ALL, MAX_CHANNEL, MAX_PASSWORD_LEN,
    MAX_SSID_LEN,
};

use crate::controller::Timing;
use crate::protocol::ProductName;
use log::warn;
use std::time::Duration;

/// Minimum spacing between report pairs.
pub const DEFAULT_REPORT_INTERVAL_MS: u32 = 1_000;

/// LED toggle period while unprovisioned.
pub const DEFAULT_BLINK_INTERVAL_MS: u32 = 500;

/// A press shorter than this opens the console prompt.
pub const SHORT_PRESS_MAX_MS: u32 = 2_000;

/// A press at least this long forces provisioning mode.
pub const LONG_PRESS_MIN_MS: u32 = 10_000;

/// Destination port of the report datagrams.
pub const DEFAULT_SERVER_PORT: u16 = 6666;

/// Port of the provisioning page.
pub const DEFAULT_PROVISIONING_PORT: u16 = 80;

/// Product name embedded in records.
pub const DEFAULT_PRODUCT_NAME: &str = "Temp1";

/// Pause after tearing down the configuration access point.
pub const AP_TEARDOWN_DELAY: Duration = Duration::from_millis(250);

/// Configuration access point advertised in provisioning mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointConfig {
    /// Advertised SSID.
    pub ssid: String,
    /// Channel, zero-indexed.
    pub channel: u8,
    /// Port of the provisioning page.
    pub port: u16,
    /// Whether the SSID is broadcast.
    pub visible: bool,
}

impl Default for AccessPointConfig {
    fn default() -> Self {
        Self {
            ssid: "SensorNode_AP".to_string(),
            channel: 0,
            port: DEFAULT_PROVISIONING_PORT,
            visible: true,
        }
    }
}

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub timing: Timing,
    pub server_port: u16,
    pub product_name: ProductName,
    pub access_point: AccessPointConfig,
    /// Compiled-in fallback credentials.
    pub default_credentials: Credentials,
    pub ap_teardown_delay: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            timing: Timing::default(),
            server_port: DEFAULT_SERVER_PORT,
            product_name: ProductName::default(),
            access_point: AccessPointConfig::default(),
            default_credentials: Credentials::fallback(),
            ap_teardown_delay: AP_TEARDOWN_DELAY,
        }
    }
}

impl NodeConfig {
    /// Apply overrides from a variable lookup.
    ///
    /// Recognized keys: `NODE_REPORT_INTERVAL_MS`, `NODE_SERVER_PORT`,
    /// `NODE_PROVISIONING_PORT`, `NODE_PRODUCT_NAME`. Invalid values are
    /// logged and skipped.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("NODE_REPORT_INTERVAL_MS") {
            match value.parse() {
                Ok(ms) => self.timing.report_interval_ms = ms,
                Err(e) => warn!("Ignoring NODE_REPORT_INTERVAL_MS={}: {}", value, e),
            }
        }
        if let Some(value) = lookup("NODE_SERVER_PORT") {
            match value.parse() {
                Ok(port) => self.server_port = port,
                Err(e) => warn!("Ignoring NODE_SERVER_PORT={}: {}", value, e),
            }
        }
        if let Some(value) = lookup("NODE_PROVISIONING_PORT") {
            match value.parse() {
                Ok(port) => self.access_point.port = port,
                Err(e) => warn!("Ignoring NODE_PROVISIONING_PORT={}: {}", value, e),
            }
        }
        if let Some(value) = lookup("NODE_PRODUCT_NAME") {
            match ProductName::new(&value) {
                Ok(name) => self.product_name = name,
                Err(e) => warn!("Ignoring NODE_PRODUCT_NAME: {}", e),
            }
        }
    }

    /// Defaults with overrides from the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }
}
