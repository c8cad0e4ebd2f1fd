//! Sensor node runner.
//!
//! [`Node`] ties the [`Controller`] to a [`Board`]: it feeds driver events,
//! inbound datagrams, button samples and timer ticks into the controller and
//! carries out the commands that come back. The same runner drives the
//! ESP32 firmware and the host simulation.
//!
//! # Example
//!
//! ```no_run
//! use iot_sensor_node::config::NodeConfig;
//! use iot_sensor_node::node::{Board, Node};
//! use iot_sensor_node::platform::net::UdpTransport;
//! use iot_sensor_node::platform::sim::{LogLed, SimulatedRadio, SimulatedSensor};
//! use iot_sensor_node::platform::terminal::stdin_terminal;
//! use iot_sensor_node::platform::MonotonicClock;
//! use std::time::Duration;
//!
//! let config = NodeConfig::default();
//! let (button, console) = stdin_terminal(Duration::from_secs(11));
//! let board = Board {
//!     radio: Box::new(SimulatedRadio::new(None)),
//!     transport: Box::new(UdpTransport::broadcast(config.server_port)),
//!     sensor: Box::new(SimulatedSensor::new()),
//!     led: Box::new(LogLed::new()),
//!     button: Box::new(button),
//!     console: Box::new(console),
//! };
//!
//! let mut node = Node::new(config, board);
//! node.start().unwrap();
//! let clock = MonotonicClock::new();
//! loop {
//!     node.poll(clock.now_ms());
//!     std::thread::sleep(Duration::from_millis(10));
//! }
//! ```

use crate::config::NodeConfig;
use crate::controller::{Command, Controller, DriverEvent};
use crate::platform::{
    Button, Console, PlatformError, RadioDriver, StatusLed, TemperatureSensor, Transport,
};
use crate::protocol::{KeepaliveRecord, ProtocolError, SensorReport};
use log::{debug, error, info, warn};
use std::net::SocketAddrV4;

/// Receive buffer size, one Ethernet MTU payload.
const RX_BUFFER_LEN: usize = 1460;

/// Lines printed before reading credentials from the console.
const CREDENTIAL_PROMPT: &[&str] = &[
    "Enter credentials and press ENTER",
    "eg: <SSID>:<Password>:<SecurityType>:<WifiChannel>",
    "For security enter",
    "  1 for open",
    "  2 for WPA-PSK",
    "  3 for WEP",
    "  4 for WPA/WPA2 Enterprise",
    "Channel 0 scans every channel",
];

/// Peripherals the node runs on.
pub struct Board {
    pub radio: Box<dyn RadioDriver>,
    pub transport: Box<dyn Transport>,
    pub sensor: Box<dyn TemperatureSensor>,
    pub led: Box<dyn StatusLed>,
    pub button: Box<dyn Button>,
    pub console: Box<dyn Console>,
}

/// A sensor node: controller plus the board it drives.
pub struct Node {
    config: NodeConfig,
    controller: Controller,
    board: Board,
    rx_buf: Vec<u8>,
}

impl Node {
    pub fn new(config: NodeConfig, board: Board) -> Self {
        let controller = Controller::new(config.timing, config.default_credentials.clone());
        Self {
            config,
            controller,
            board,
            rx_buf: vec![0u8; RX_BUFFER_LEN],
        }
    }

    /// Bring up the radio and start resuming the stored network.
    ///
    /// An error means the radio could not be initialized and the node
    /// cannot run.
    pub fn start(&mut self) -> Result<(), PlatformError> {
        self.board.radio.init()?;
        info!(
            "{} node starting, reports to port {}",
            self.config.product_name, self.config.server_port
        );
        let commands = self.controller.begin();
        self.execute(commands);
        Ok(())
    }

    /// Run one loop iteration at time `now_ms`.
    pub fn poll(&mut self, now_ms: u32) {
        for event in self.board.radio.poll_events() {
            let commands = self.controller.on_driver_event(event);
            self.execute(commands);
        }

        self.receive_reports();

        let pressed = self.board.button.is_pressed();
        let commands = self.controller.on_button_sample(pressed, now_ms);
        self.execute(commands);

        let commands = self.controller.tick(now_ms);
        self.execute(commands);
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Drain inbound datagrams and hand matching reports to the controller.
    ///
    /// Reports are only acted on while connected; otherwise they are
    /// discarded so stale ones do not apply after the next join.
    fn receive_reports(&mut self) {
        if !self.board.transport.is_open() {
            return;
        }
        loop {
            let len = match self.board.transport.try_recv(&mut self.rx_buf) {
                Ok(Some(len)) => len,
                Ok(None) => break,
                Err(e) => {
                    warn!("Receive failed: {}", e);
                    break;
                }
            };
            match SensorReport::decode(&self.rx_buf[..len], &self.config.product_name) {
                Ok(_) if !self.controller.is_connected() => {
                    debug!("Dropping report received while not connected");
                }
                Ok(report) => {
                    let commands = self
                        .controller
                        .on_driver_event(DriverEvent::RemoteReport(report));
                    self.execute(commands);
                }
                Err(ProtocolError::TooShort { .. }) => {}
                Err(e) => debug!("Ignoring datagram: {}", e),
            }
        }
    }

    fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            self.execute_one(command);
        }
    }

    fn execute_one(&mut self, command: Command) {
        let radio = &mut self.board.radio;
        let result = match command {
            Command::ResumeStoredNetwork => radio.resume_stored_network(),
            Command::Connect(credentials) => radio.connect(&credentials),
            Command::RequestConnectionInfo => radio.request_connection_info(),
            Command::RequestAddress => radio.request_address(),
            Command::StartProvisioning => {
                match radio.start_provisioning(&self.config.access_point) {
                    Ok(page) => {
                        self.print_provisioning_details(page);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            Command::StopProvisioning => {
                let result = radio.stop_provisioning();
                if !self.config.ap_teardown_delay.is_zero() {
                    std::thread::sleep(self.config.ap_teardown_delay);
                }
                result
            }
            Command::PromptCredentials => {
                self.prompt_credentials();
                Ok(())
            }
            Command::SetLed(on) => {
                self.board.led.set(on);
                Ok(())
            }
            Command::SendReport { led_on } => {
                self.send_reports(led_on);
                Ok(())
            }
        };
        if let Err(e) = result {
            error!("Driver command failed: {}", e);
        }
    }

    fn print_provisioning_details(&mut self, page: SocketAddrV4) {
        let url = match page.port() {
            80 => format!("http://{}/", page.ip()),
            _ => format!("http://{}/", page),
        };
        let console = &mut self.board.console;
        console.write_line("");
        console.write_line(&format!(
            "Started as access point {}",
            self.config.access_point.ssid
        ));
        console.write_line(&format!(
            "Open {} in your browser and enter credentials in the served page",
            url
        ));
        console.write_line(
            "If the page is not served, press the button briefly and enter credentials here",
        );
    }

    fn prompt_credentials(&mut self) {
        for line in CREDENTIAL_PROMPT {
            self.board.console.write_line(line);
        }
        let line = match self.board.console.read_line() {
            Ok(line) => line,
            Err(e) => {
                warn!("No console input ({}), using default credentials", e);
                String::new()
            }
        };
        self.board.console.write_line("");
        let commands = self.controller.on_credentials_entered(&line);
        self.execute(commands);
    }

    /// Send a keepalive followed by a sensor report.
    fn send_reports(&mut self, led_on: bool) {
        let transport = &mut self.board.transport;
        if !transport.is_open() {
            if let Err(e) = transport.open() {
                error!("Failed to create UDP sockets: {}", e);
                return;
            }
        }

        let celsius = match self.board.sensor.read_celsius() {
            Ok(celsius) => celsius,
            Err(e) => {
                warn!("Skipping report: {}", e);
                return;
            }
        };

        let product = self.config.product_name.clone();
        if let Err(e) = transport.send(&KeepaliveRecord::new(product.clone()).encode()) {
            warn!("Failed to send keepalive: {}", e);
        }
        let report = SensorReport::from_celsius(product, led_on, celsius);
        match transport.send(&report.encode()) {
            Ok(()) => info!("Sensor report sent ({:.2} C)", celsius),
            Err(e) => error!("Failed to send status report: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccessPointConfig, Credentials, SecurityType};
    use crate::controller::{ConnectionState, LinkState, ResumeFailure};
    use crate::protocol::{ProductName, KEEPALIVE_LEN, REPORT_LEN};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::net::Ipv4Addr;
    use std::rc::Rc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Resume,
        Connect(String),
        Info,
        Address,
        StartAp,
        StopAp,
        Led(bool),
        Sent(Vec<u8>),
        Wrote(String),
    }

    /// Everything the fakes observe, in order.
    #[derive(Default)]
    struct World {
        calls: Vec<Call>,
        events: VecDeque<DriverEvent>,
        inbound: VecDeque<Vec<u8>>,
        console_input: VecDeque<String>,
        pressed: bool,
        open_fails: bool,
        ap_fails: bool,
    }

    type Shared = Rc<RefCell<World>>;

    struct FakeRadio(Shared);
    struct FakeTransport(Shared, bool);
    struct FakeSensor;
    struct FakeLed(Shared);
    struct FakeButton(Shared);
    struct FakeConsole(Shared);

    impl RadioDriver for FakeRadio {
        fn init(&mut self) -> Result<(), PlatformError> {
            Ok(())
        }
        fn resume_stored_network(&mut self) -> Result<(), PlatformError> {
            self.0.borrow_mut().calls.push(Call::Resume);
            Ok(())
        }
        fn connect(&mut self, credentials: &Credentials) -> Result<(), PlatformError> {
            let mut world = self.0.borrow_mut();
            world.calls.push(Call::Connect(credentials.ssid.clone()));
            Ok(())
        }
        fn request_connection_info(&mut self) -> Result<(), PlatformError> {
            self.0.borrow_mut().calls.push(Call::Info);
            Ok(())
        }
        fn request_address(&mut self) -> Result<(), PlatformError> {
            self.0.borrow_mut().calls.push(Call::Address);
            Ok(())
        }
        fn start_provisioning(
            &mut self,
            _: &AccessPointConfig,
        ) -> Result<SocketAddrV4, PlatformError> {
            let mut world = self.0.borrow_mut();
            world.calls.push(Call::StartAp);
            if world.ap_fails {
                return Err(PlatformError::Radio("AP start failed".into()));
            }
            Ok(SocketAddrV4::new(Ipv4Addr::new(192, 168, 4, 1), 80))
        }
        fn stop_provisioning(&mut self) -> Result<(), PlatformError> {
            self.0.borrow_mut().calls.push(Call::StopAp);
            Ok(())
        }
        fn poll_events(&mut self) -> Vec<DriverEvent> {
            self.0.borrow_mut().events.drain(..).collect()
        }
    }

    impl Transport for FakeTransport {
        fn open(&mut self) -> Result<(), PlatformError> {
            if self.0.borrow().open_fails {
                return Err(PlatformError::Radio("no sockets".into()));
            }
            self.1 = true;
            Ok(())
        }
        fn is_open(&self) -> bool {
            self.1
        }
        fn send(&mut self, datagram: &[u8]) -> Result<(), PlatformError> {
            self.0.borrow_mut().calls.push(Call::Sent(datagram.to_vec()));
            Ok(())
        }
        fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>, PlatformError> {
            match self.0.borrow_mut().inbound.pop_front() {
                Some(datagram) => {
                    buf[..datagram.len()].copy_from_slice(&datagram);
                    Ok(Some(datagram.len()))
                }
                None => Ok(None),
            }
        }
    }

    impl TemperatureSensor for FakeSensor {
        fn read_celsius(&mut self) -> Result<f32, PlatformError> {
            Ok(23.45)
        }
    }

    impl StatusLed for FakeLed {
        fn set(&mut self, on: bool) {
            self.0.borrow_mut().calls.push(Call::Led(on));
        }
    }

    impl Button for FakeButton {
        fn is_pressed(&mut self) -> bool {
            self.0.borrow().pressed
        }
    }

    impl Console for FakeConsole {
        fn write_line(&mut self, line: &str) {
            self.0.borrow_mut().calls.push(Call::Wrote(line.to_string()));
        }
        fn read_line(&mut self) -> Result<String, PlatformError> {
            self.0
                .borrow_mut()
                .console_input
                .pop_front()
                .ok_or(PlatformError::ConsoleClosed)
        }
    }

    fn node() -> (Node, Shared) {
        let world: Shared = Rc::new(RefCell::new(World::default()));
        let board = Board {
            radio: Box::new(FakeRadio(world.clone())),
            transport: Box::new(FakeTransport(world.clone(), false)),
            sensor: Box::new(FakeSensor),
            led: Box::new(FakeLed(world.clone())),
            button: Box::new(FakeButton(world.clone())),
            console: Box::new(FakeConsole(world.clone())),
        };
        let config = NodeConfig {
            ap_teardown_delay: Duration::ZERO,
            default_credentials: Credentials::new(
                "Fallback",
                "fallbackpw",
                SecurityType::WpaPsk,
                crate::config::CHANNEL_ALL,
            )
            .unwrap(),
            ..NodeConfig::default()
        };
        (Node::new(config, board), world)
    }

    fn push_event(world: &Shared, event: DriverEvent) {
        world.borrow_mut().events.push_back(event);
    }

    fn take_calls(world: &Shared) -> Vec<Call> {
        std::mem::take(&mut world.borrow_mut().calls)
    }

    fn connect(node: &mut Node, world: &Shared, now_ms: u32) {
        push_event(world, DriverEvent::ConnectionChanged(LinkState::Up));
        push_event(
            world,
            DriverEvent::AddressAssigned(Ipv4Addr::new(192, 168, 1, 100)),
        );
        node.poll(now_ms);
    }

    fn sent(calls: &[Call]) -> Vec<Vec<u8>> {
        calls
            .iter()
            .filter_map(|c| match c {
                Call::Sent(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_start_resumes_stored_network() {
        let (mut node, world) = node();
        node.start().unwrap();
        assert_eq!(take_calls(&world), vec![Call::Resume]);
        assert_eq!(node.controller().state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_connect_then_report_pair() {
        let (mut node, world) = node();
        node.start().unwrap();
        take_calls(&world);

        connect(&mut node, &world, 100);
        let calls = take_calls(&world);
        assert_eq!(&calls[..3], &[Call::Info, Call::Address, Call::Led(true)]);

        let datagrams = sent(&calls);
        assert_eq!(datagrams.len(), 2);
        assert_eq!(datagrams[0].len(), KEEPALIVE_LEN);
        assert_eq!(&datagrams[0][..2], &[0x00, 0x01]);
        assert_eq!(datagrams[1].len(), REPORT_LEN);
        assert_eq!(datagrams[1][11], 1);
        assert_eq!(&datagrams[1][12..], &2345i32.to_le_bytes());
    }

    #[test]
    fn test_reports_respect_interval() {
        let (mut node, world) = node();
        node.start().unwrap();
        connect(&mut node, &world, 0);
        take_calls(&world);

        node.poll(1_000);
        assert!(sent(&take_calls(&world)).is_empty());
        node.poll(1_001);
        assert_eq!(sent(&take_calls(&world)).len(), 2);
    }

    #[test]
    fn test_transport_open_failure_skips_report() {
        let (mut node, world) = node();
        world.borrow_mut().open_fails = true;
        node.start().unwrap();
        connect(&mut node, &world, 0);
        assert!(sent(&take_calls(&world)).is_empty());
        assert!(node.controller().is_connected());
    }

    #[test]
    fn test_remote_report_sets_led_for_next_report() {
        let (mut node, world) = node();
        node.start().unwrap();
        connect(&mut node, &world, 0);
        take_calls(&world);

        let remote = SensorReport::new(ProductName::default(), false, 0).encode();
        world.borrow_mut().inbound.push_back(remote.to_vec());
        node.poll(10);
        assert_eq!(take_calls(&world), vec![Call::Led(false)]);

        node.poll(1_001);
        let datagrams = sent(&take_calls(&world));
        assert_eq!(datagrams.len(), 2);
        assert_eq!(datagrams[1][11], 0);
    }

    #[test]
    fn test_reports_ignored_while_provisioning() {
        let (mut node, world) = node();
        node.start().unwrap();
        connect(&mut node, &world, 0);

        world.borrow_mut().pressed = true;
        node.poll(100);
        world.borrow_mut().pressed = false;
        node.poll(10_200);
        assert_eq!(node.controller().state(), ConnectionState::Provisioning);
        assert!(!node.controller().led_on());
        take_calls(&world);

        let remote = SensorReport::new(ProductName::default(), true, 0).encode();
        world.borrow_mut().inbound.push_back(remote.to_vec());
        node.poll(10_300);

        assert!(take_calls(&world).is_empty());
        assert!(world.borrow().inbound.is_empty());
        assert!(!node.controller().led_on());
    }

    #[test]
    fn test_foreign_datagrams_ignored() {
        let (mut node, world) = node();
        node.start().unwrap();
        connect(&mut node, &world, 0);
        take_calls(&world);

        let other = ProductName::new("Other").unwrap();
        world
            .borrow_mut()
            .inbound
            .push_back(SensorReport::new(other, false, 0).encode().to_vec());
        world.borrow_mut().inbound.push_back(vec![0, 2, 1]);
        node.poll(10);

        assert!(take_calls(&world).is_empty());
        assert!(node.controller().led_on());
    }

    #[test]
    fn test_no_stored_network_starts_provisioning() {
        let (mut node, world) = node();
        node.start().unwrap();
        take_calls(&world);

        push_event(
            &world,
            DriverEvent::ResumeFailed(ResumeFailure::NoStoredNetwork),
        );
        node.poll(0);

        let calls = take_calls(&world);
        assert_eq!(calls[0], Call::StartAp);
        assert!(calls
            .iter()
            .any(|c| matches!(c, Call::Wrote(line) if line.contains("SensorNode_AP"))));
        assert!(calls
            .iter()
            .any(|c| matches!(c, Call::Wrote(line) if line.contains("http://192.168.4.1/ "))));
        assert_eq!(node.controller().state(), ConnectionState::Provisioning);
    }

    #[test]
    fn test_failed_access_point_prints_no_instructions() {
        let (mut node, world) = node();
        world.borrow_mut().ap_fails = true;
        node.start().unwrap();
        take_calls(&world);

        push_event(
            &world,
            DriverEvent::ResumeFailed(ResumeFailure::NoStoredNetwork),
        );
        node.poll(0);

        let calls = take_calls(&world);
        assert_eq!(calls[0], Call::StartAp);
        assert!(!calls.iter().any(|c| matches!(c, Call::Wrote(_))));
        assert_eq!(node.controller().state(), ConnectionState::Provisioning);
    }

    #[test]
    fn test_console_credentials_flow() {
        let (mut node, world) = node();
        node.start().unwrap();
        push_event(
            &world,
            DriverEvent::ResumeFailed(ResumeFailure::NoStoredNetwork),
        );
        node.poll(0);
        take_calls(&world);

        world
            .borrow_mut()
            .console_input
            .push_back("HomeNet:secret:2:6\n".into());
        world.borrow_mut().pressed = true;
        node.poll(1_000);
        world.borrow_mut().pressed = false;
        node.poll(1_500);

        let calls = take_calls(&world);
        let stop = calls.iter().position(|c| *c == Call::StopAp).unwrap();
        let join = calls
            .iter()
            .position(|c| *c == Call::Connect("HomeNet".into()))
            .unwrap();
        assert!(calls
            .iter()
            .any(|c| matches!(c, Call::Wrote(line) if line.contains("<SSID>"))));
        assert!(stop < join);
        assert_eq!(node.controller().credentials().unwrap().channel, 5);
        assert!(node.controller().is_provisioned());
    }

    #[test]
    fn test_closed_console_uses_defaults() {
        let (mut node, world) = node();
        node.start().unwrap();
        push_event(
            &world,
            DriverEvent::ResumeFailed(ResumeFailure::NoStoredNetwork),
        );
        node.poll(0);
        world.borrow_mut().pressed = true;
        node.poll(100);
        world.borrow_mut().pressed = false;
        node.poll(200);

        assert!(take_calls(&world).contains(&Call::Connect("Fallback".into())));
    }

    #[test]
    fn test_unprovisioned_led_blinks() {
        let (mut node, world) = node();
        node.start().unwrap();
        push_event(
            &world,
            DriverEvent::ResumeFailed(ResumeFailure::NoStoredNetwork),
        );
        node.poll(0);
        take_calls(&world);

        node.poll(500);
        node.poll(700);
        node.poll(1_000);
        let leds: Vec<_> = take_calls(&world)
            .into_iter()
            .filter(|c| matches!(c, Call::Led(_)))
            .collect();
        assert_eq!(leds, vec![Call::Led(true), Call::Led(false)]);
    }

    #[test]
    fn test_link_loss_reconnects() {
        let (mut node, world) = node();
        node.start().unwrap();
        connect(&mut node, &world, 0);
        take_calls(&world);

        push_event(&world, DriverEvent::ConnectionChanged(LinkState::Down));
        node.poll(5_000);
        assert_eq!(take_calls(&world), vec![Call::Connect("Fallback".into())]);
        assert!(!node.controller().is_connected());
    }
}
