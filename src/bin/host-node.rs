//! Host-based sensor node for development and testing.
//!
//! Runs the node loop against a simulated radio and sensor, sending real UDP
//! reports and serving the real provisioning page:
//! - Type `press` for a short button press, `hold` for a long one
//! - Provisioning page on http://localhost:8080/ while advertising
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin host-node
//! NODE_SERVER_PORT=7777 NODE_PRODUCT_NAME=Lab2 cargo run --bin host-node
//! ```
//!
//! Set `HOST_NODE_STORED_SSID` to start as if that network were stored;
//! otherwise the node comes up in provisioning mode.

use iot_sensor_node::config::{Credentials, NodeConfig, SecurityType, CHANNEL_ALL};
use iot_sensor_node::platform::net::UdpTransport;
use iot_sensor_node::platform::sim::{LogLed, SimulatedRadio, SimulatedSensor};
use iot_sensor_node::platform::terminal::stdin_terminal;
use iot_sensor_node::{Board, MonotonicClock, Node};
use log::{error, info, warn};
use std::time::Duration;

/// Provisioning port on the host; port 80 needs privileges.
const HOST_PROVISIONING_PORT: u16 = 8080;

/// Main loop period.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=== Sensor Host Node starting ===");

    let mut config = NodeConfig::default();
    config.access_point.port = HOST_PROVISIONING_PORT;
    config.apply_env(|key| std::env::var(key).ok());

    let stored = std::env::var("HOST_NODE_STORED_SSID").ok().and_then(|ssid| {
        match Credentials::new(ssid, "", SecurityType::Open, CHANNEL_ALL) {
            Ok(creds) => Some(creds),
            Err(e) => {
                warn!("Ignoring HOST_NODE_STORED_SSID: {}", e);
                None
            }
        }
    });

    // Hold a bit past the long-press threshold so one `hold` always counts.
    let hold = Duration::from_millis(u64::from(config.timing.press.long_min_ms) + 500);
    let (button, console) = stdin_terminal(hold);

    let board = Board {
        radio: Box::new(SimulatedRadio::new(stored)),
        transport: Box::new(UdpTransport::broadcast(config.server_port)),
        sensor: Box::new(SimulatedSensor::new()),
        led: Box::new(LogLed::new()),
        button: Box::new(button),
        console: Box::new(console),
    };

    let mut node = Node::new(config, board);
    if let Err(e) = node.start() {
        error!("Node initialization failed: {}", e);
        std::process::exit(1);
    }

    info!("Entering main loop (Ctrl+C to exit)...");

    let clock = MonotonicClock::new();
    loop {
        node.poll(clock.now_ms());
        std::thread::sleep(POLL_INTERVAL);
    }
}
