//! Simulated devices for running the node on a development machine.
//!
//! [`SimulatedRadio`] behaves like a radio that always finds the network it
//! is asked to join. Provisioning mode serves the real HTTP page through
//! [`ProvisioningServer`], so the whole flow can be exercised with `curl`.

use super::{PlatformError, RadioDriver, StatusLed, TemperatureSensor};
use crate::config::{AccessPointConfig, Credentials};
use crate::controller::{DriverEvent, LinkState, ProvisionResult, ResumeFailure};
use crate::provisioning::ProvisioningServer;
use log::{debug, info};
use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Radio that joins instantly and hands out a fixed address.
pub struct SimulatedRadio {
    stored: Option<Credentials>,
    joined: Option<String>,
    address: Ipv4Addr,
    pending: VecDeque<DriverEvent>,
    server: Option<ProvisioningServer>,
}

impl SimulatedRadio {
    /// Radio with an optional network already stored.
    pub fn new(stored: Option<Credentials>) -> Self {
        Self {
            stored,
            joined: None,
            address: Ipv4Addr::new(192, 168, 1, 100),
            pending: VecDeque::new(),
            server: None,
        }
    }

    /// Simulate the access point going away.
    #[cfg(test)]
    pub fn drop_link(&mut self) {
        if self.joined.take().is_some() {
            self.pending
                .push_back(DriverEvent::ConnectionChanged(LinkState::Down));
        }
    }

    /// Port of the provisioning page while it is served.
    pub fn provisioning_port(&self) -> Option<u16> {
        self.server.as_ref().map(|s| s.port())
    }

    fn join(&mut self, ssid: &str) {
        info!("Simulated join of '{}'", ssid);
        self.joined = Some(ssid.to_string());
        self.pending
            .push_back(DriverEvent::ConnectionChanged(LinkState::Up));
    }
}

impl RadioDriver for SimulatedRadio {
    fn init(&mut self) -> Result<(), PlatformError> {
        debug!("Simulated radio ready");
        Ok(())
    }

    fn resume_stored_network(&mut self) -> Result<(), PlatformError> {
        match self.stored.as_ref().map(|c| c.ssid.clone()) {
            Some(ssid) => self.join(&ssid),
            None => self
                .pending
                .push_back(DriverEvent::ResumeFailed(ResumeFailure::NoStoredNetwork)),
        }
        Ok(())
    }

    fn connect(&mut self, credentials: &Credentials) -> Result<(), PlatformError> {
        self.stored = Some(credentials.clone());
        self.join(&credentials.ssid);
        Ok(())
    }

    fn request_connection_info(&mut self) -> Result<(), PlatformError> {
        let ssid = self.joined.clone().ok_or_else(|| {
            PlatformError::Radio("connection info requested while not joined".into())
        })?;
        self.pending.push_back(DriverEvent::ConnectionInfo { ssid });
        Ok(())
    }

    fn request_address(&mut self) -> Result<(), PlatformError> {
        self.pending
            .push_back(DriverEvent::AddressAssigned(self.address));
        Ok(())
    }

    fn start_provisioning(
        &mut self,
        access_point: &AccessPointConfig,
    ) -> Result<SocketAddrV4, PlatformError> {
        self.joined = None;
        self.server = None;
        let server = ProvisioningServer::start(None, access_point.port, &access_point.ssid)?;
        let page = SocketAddrV4::new(Ipv4Addr::LOCALHOST, server.port());
        info!(
            "Simulated access point '{}' up, provisioning page on {}",
            access_point.ssid, page
        );
        self.server = Some(server);
        Ok(page)
    }

    fn stop_provisioning(&mut self) -> Result<(), PlatformError> {
        if self.server.take().is_some() {
            info!("Simulated access point down");
        }
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<DriverEvent> {
        let submitted = self.server.as_ref().and_then(|s| s.try_result());
        if let Some(result) = submitted {
            // The access point goes down once the page has been submitted.
            self.server = None;
            if let ProvisionResult::Success(credentials) = &result {
                self.stored = Some(credentials.clone());
            }
            self.pending.push_front(DriverEvent::Provisioned(result));
        }
        self.pending.drain(..).collect()
    }
}

/// Sensor producing a slow saw-tooth around room temperature.
#[derive(Debug, Default)]
pub struct SimulatedSensor {
    reads: u32,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TemperatureSensor for SimulatedSensor {
    fn read_celsius(&mut self) -> Result<f32, PlatformError> {
        let step = self.reads % 20;
        self.reads = self.reads.wrapping_add(1);
        Ok(21.0 + step as f32 * 0.1)
    }
}

/// LED that logs its transitions.
#[derive(Debug, Default)]
pub struct LogLed {
    on: bool,
}

impl LogLed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

impl StatusLed for LogLed {
    fn set(&mut self, on: bool) {
        if on != self.on {
            debug!("LED {}", if on { "on" } else { "off" });
        }
        self.on = on;
    }
}
