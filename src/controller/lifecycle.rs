//! Connection lifecycle state machine.
//!
//! The controller owns all lifecycle state and never touches hardware.
//! Every input returns the commands the caller must carry out, in order.
//!
//! # Example
//!
//! ```
//! use iot_sensor_node::config::Credentials;
//! use iot_sensor_node::controller::{
//!     Command, ConnectionState, Controller, DriverEvent, LinkState, Timing,
//! };
//!
//! let mut controller = Controller::new(Timing::default(), Credentials::fallback());
//! assert_eq!(controller.begin(), vec![Command::ResumeStoredNetwork]);
//!
//! let commands = controller.on_driver_event(DriverEvent::ConnectionChanged(LinkState::Up));
//! assert_eq!(controller.state(), ConnectionState::Connected);
//! assert!(commands.contains(&Command::RequestAddress));
//! ```

use super::button::{ButtonPress, ButtonTracker, PressThresholds};
use super::event::{
    Command, ConnectionState, DriverEvent, LinkState, ProvisionResult, ResumeFailure,
};
use crate::config::{
    Credentials, DEFAULT_BLINK_INTERVAL_MS, DEFAULT_REPORT_INTERVAL_MS, LONG_PRESS_MIN_MS,
    SHORT_PRESS_MAX_MS,
};
use crate::protocol::SensorReport;
use log::{debug, info, warn};
use std::net::Ipv4Addr;

/// Timing parameters of the lifecycle, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Minimum spacing between two report pairs (exclusive).
    pub report_interval_ms: u32,
    /// LED toggle period while unprovisioned.
    pub blink_interval_ms: u32,
    /// Short and long press limits.
    pub press: PressThresholds,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            report_interval_ms: DEFAULT_REPORT_INTERVAL_MS,
            blink_interval_ms: DEFAULT_BLINK_INTERVAL_MS,
            press: PressThresholds {
                short_max_ms: SHORT_PRESS_MAX_MS,
                long_min_ms: LONG_PRESS_MIN_MS,
            },
        }
    }
}

/// Connection lifecycle controller.
pub struct Controller {
    state: ConnectionState,
    timing: Timing,
    /// Compiled-in credentials, used for missing console fields.
    defaults: Credentials,
    /// Credentials of the last explicit join. `None` until one happens, in
    /// which case reconnects use `defaults`.
    credentials: Option<Credentials>,
    /// Cleared while the configuration access point is the only way in.
    provisioned: bool,
    awaiting_credentials: bool,
    /// Connected with an address; reports may flow.
    link_usable: bool,
    led_on: bool,
    button: ButtonTracker,
    last_blink_ms: u32,
    last_report_ms: Option<u32>,
}

impl Controller {
    /// Create a controller that will try to resume the stored network.
    pub fn new(timing: Timing, defaults: Credentials) -> Self {
        Self {
            state: ConnectionState::Connecting,
            timing,
            defaults,
            credentials: None,
            provisioned: true,
            awaiting_credentials: false,
            link_usable: false,
            led_on: false,
            button: ButtonTracker::new(),
            last_blink_ms: 0,
            last_report_ms: None,
        }
    }

    /// Commands to issue once at startup.
    pub fn begin(&mut self) -> Vec<Command> {
        info!("Resuming previously stored network");
        vec![Command::ResumeStoredNetwork]
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Credentials of the last explicit join, if any.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn is_provisioned(&self) -> bool {
        self.provisioned
    }

    /// True once an address is assigned; cleared on link loss or provisioning.
    pub fn is_connected(&self) -> bool {
        self.link_usable
    }

    pub fn is_awaiting_credentials(&self) -> bool {
        self.awaiting_credentials
    }

    pub fn led_on(&self) -> bool {
        self.led_on
    }

    /// React to a driver or socket notification.
    pub fn on_driver_event(&mut self, event: DriverEvent) -> Vec<Command> {
        match event {
            DriverEvent::ConnectionChanged(LinkState::Up) => self.on_link_up(),
            DriverEvent::ConnectionChanged(LinkState::Down) => self.on_link_down(),
            DriverEvent::ResumeFailed(reason) => self.on_resume_failed(reason),
            DriverEvent::ConnectionInfo { ssid } => {
                info!("Connected to {}", ssid);
                Vec::new()
            }
            DriverEvent::AddressAssigned(ip) => self.on_address_assigned(ip),
            DriverEvent::Provisioned(result) => self.on_provisioned(result),
            DriverEvent::RemoteReport(report) => self.on_remote_report(report),
        }
    }

    /// Feed one button level sample.
    pub fn on_button_sample(&mut self, pressed: bool, now_ms: u32) -> Vec<Command> {
        let Some(duration_ms) = self.button.sample(pressed, now_ms) else {
            return Vec::new();
        };

        match self.timing.press.classify(duration_ms) {
            ButtonPress::Long => {
                info!("Button held {} ms, forcing provisioning mode", duration_ms);
                self.enter_provisioning()
            }
            ButtonPress::Short
                if !self.provisioned && self.state == ConnectionState::Provisioning =>
            {
                self.awaiting_credentials = true;
                vec![Command::PromptCredentials]
            }
            _ => {
                debug!("Button press of {} ms ignored", duration_ms);
                Vec::new()
            }
        }
    }

    /// Handle the console line typed after a credential prompt.
    pub fn on_credentials_entered(&mut self, line: &str) -> Vec<Command> {
        if !self.awaiting_credentials {
            warn!("Console credentials received without a prompt, ignoring");
            return Vec::new();
        }
        self.awaiting_credentials = false;

        let creds = Credentials::parse_console_line(line, &self.defaults);
        info!(
            "Joining {} ({}) with console credentials",
            creds.ssid, creds.security
        );
        self.credentials = Some(creds.clone());
        self.provisioned = true;
        vec![Command::StopProvisioning, Command::Connect(creds)]
    }

    /// Advance timers. Call once per loop iteration.
    pub fn tick(&mut self, now_ms: u32) -> Vec<Command> {
        let mut commands = Vec::new();

        if !self.provisioned
            && now_ms.wrapping_sub(self.last_blink_ms) >= self.timing.blink_interval_ms
        {
            self.last_blink_ms = now_ms;
            self.led_on = !self.led_on;
            commands.push(Command::SetLed(self.led_on));
        }

        if self.link_usable && self.report_due(now_ms) {
            self.last_report_ms = Some(now_ms);
            commands.push(Command::SendReport {
                led_on: self.led_on,
            });
        }

        commands
    }

    fn report_due(&self, now_ms: u32) -> bool {
        match self.last_report_ms {
            None => true,
            Some(last) => now_ms.wrapping_sub(last) > self.timing.report_interval_ms,
        }
    }

    fn on_link_up(&mut self) -> Vec<Command> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Disconnected => {}
            ConnectionState::Provisioning if self.provisioned => {}
            ConnectionState::Provisioning => {
                debug!("Link up while advertising, ignoring");
                return Vec::new();
            }
            ConnectionState::Connected => return Vec::new(),
        }
        info!("Link up, requesting address");
        self.state = ConnectionState::Connected;
        vec![Command::RequestConnectionInfo, Command::RequestAddress]
    }

    fn on_link_down(&mut self) -> Vec<Command> {
        self.link_usable = false;

        if self.state == ConnectionState::Provisioning && !self.provisioned {
            debug!("Link down while advertising, ignoring");
            return Vec::new();
        }
        if self.state == ConnectionState::Disconnected && self.credentials.is_none() {
            return Vec::new();
        }

        if self.state != ConnectionState::Provisioning {
            self.state = ConnectionState::Connecting;
        }
        let creds = self.credentials.as_ref().unwrap_or(&self.defaults);
        info!("Link down, reconnecting to {}", creds.ssid);
        vec![Command::Connect(creds.clone())]
    }

    fn on_resume_failed(&mut self, reason: ResumeFailure) -> Vec<Command> {
        match reason {
            ResumeFailure::NoMatchingNetwork | ResumeFailure::NoStoredNetwork => {
                if self.state == ConnectionState::Provisioning {
                    return Vec::new();
                }
                info!("No stored network available ({:?})", reason);
                self.enter_provisioning()
            }
            ResumeFailure::Other(code) => {
                warn!("Resuming stored network failed with code {}", code);
                if self.state == ConnectionState::Connecting {
                    self.state = ConnectionState::Disconnected;
                }
                Vec::new()
            }
        }
    }

    fn on_address_assigned(&mut self, ip: Ipv4Addr) -> Vec<Command> {
        if self.state != ConnectionState::Connected || !self.provisioned {
            debug!("Address {} assigned outside of a station link, ignoring", ip);
            return Vec::new();
        }
        info!("Address assigned: {}", ip);
        self.link_usable = true;
        self.led_on = true;
        self.last_report_ms = None;
        vec![Command::SetLed(true)]
    }

    fn on_provisioned(&mut self, result: ProvisionResult) -> Vec<Command> {
        match result {
            ProvisionResult::Success(creds) => {
                if self.state != ConnectionState::Provisioning {
                    warn!("Provisioning result outside provisioning mode, ignoring");
                    return Vec::new();
                }
                info!("Provisioned for {}", creds.ssid);
                if !creds.is_open() {
                    debug!("Provisioned with {} passphrase", creds.security);
                }
                self.credentials = Some(creds.clone());
                self.provisioned = true;
                self.awaiting_credentials = false;
                self.state = ConnectionState::Connecting;
                vec![Command::Connect(creds)]
            }
            ProvisionResult::Failed(reason) => {
                warn!("Provisioning failed: {}", reason);
                Vec::new()
            }
        }
    }

    fn on_remote_report(&mut self, report: SensorReport) -> Vec<Command> {
        info!("Received app message, LED {}", if report.led_on { "on" } else { "off" });
        // The new state goes out with the next scheduled report.
        self.led_on = report.led_on;
        vec![Command::SetLed(report.led_on)]
    }

    fn enter_provisioning(&mut self) -> Vec<Command> {
        self.state = ConnectionState::Provisioning;
        self.provisioned = false;
        self.awaiting_credentials = false;
        self.link_usable = false;
        self.last_report_ms = None;
        vec![Command::StartProvisioning]
    }
}
