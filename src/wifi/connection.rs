//! ESP-IDF WiFi radio driver.
//!
//! Wraps the blocking ESP-IDF WiFi driver behind [`RadioDriver`]. Operations
//! block until the driver answers and queue the outcome as a
//! [`DriverEvent`], which the node picks up on its next poll.

use super::storage::{load_credentials, save_credentials};
use crate::config::{AccessPointConfig, Credentials, SecurityType, CHANNEL_ALL};
use crate::controller::{DriverEvent, LinkState, ProvisionResult, ResumeFailure};
use crate::platform::{PlatformError, RadioDriver};
use crate::provisioning::ProvisioningServer;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::{EspNvs, NvsDefault};
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, BlockingWifi, ClientConfiguration, Configuration,
    EspWifi,
};
use log::{info, warn};
use std::collections::VecDeque;
use std::net::SocketAddrV4;

/// WiFi radio on the ESP32 modem.
pub struct EspRadio<'a> {
    wifi: BlockingWifi<EspWifi<'a>>,
    nvs: EspNvs<NvsDefault>,
    pending: VecDeque<DriverEvent>,
    server: Option<ProvisioningServer>,
    /// Station link believed up; used to detect link loss.
    associated: bool,
}

impl<'a> EspRadio<'a> {
    /// Create the driver. Credentials are persisted in `nvs`.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspNvs<NvsDefault>,
    ) -> Result<Self, PlatformError> {
        let esp_wifi = EspWifi::new(modem, sysloop.clone(), None)?;
        let wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;

        Ok(Self {
            wifi,
            nvs,
            pending: VecDeque::new(),
            server: None,
            associated: false,
        })
    }

    fn join(&mut self, credentials: &Credentials) -> Result<(), PlatformError> {
        info!("Connecting to WiFi: {}", credentials.ssid);

        let wifi_config = Configuration::Client(ClientConfiguration {
            ssid: credentials
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| PlatformError::Radio("invalid SSID".into()))?,
            password: credentials
                .password
                .as_str()
                .try_into()
                .map_err(|_| PlatformError::Radio("invalid password".into()))?,
            auth_method: auth_method(credentials.security),
            channel: match credentials.channel {
                CHANNEL_ALL => None,
                zero_indexed => Some(zero_indexed + 1),
            },
            ..Default::default()
        });

        self.wifi.set_configuration(&wifi_config)?;
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        self.wifi.connect()?;
        Ok(())
    }

    fn stop_access_point(&mut self) -> Result<(), PlatformError> {
        if self.server.take().is_some() {
            info!("Stopping configuration access point");
        }
        if self.wifi.is_started()? {
            self.wifi.stop()?;
        }
        Ok(())
    }
}

impl RadioDriver for EspRadio<'_> {
    fn init(&mut self) -> Result<(), PlatformError> {
        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration::default()))?;
        self.wifi.start()?;
        info!("WiFi driver started");
        Ok(())
    }

    fn resume_stored_network(&mut self) -> Result<(), PlatformError> {
        let Some(credentials) = load_credentials(&self.nvs) else {
            self.pending
                .push_back(DriverEvent::ResumeFailed(ResumeFailure::NoStoredNetwork));
            return Ok(());
        };

        match self.join(&credentials) {
            Ok(()) => {
                self.associated = true;
                self.pending
                    .push_back(DriverEvent::ConnectionChanged(LinkState::Up));
            }
            Err(e) => {
                warn!("Stored network '{}' not joined: {}", credentials.ssid, e);
                self.pending
                    .push_back(DriverEvent::ResumeFailed(ResumeFailure::NoMatchingNetwork));
            }
        }
        Ok(())
    }

    fn connect(&mut self, credentials: &Credentials) -> Result<(), PlatformError> {
        if let Err(e) = save_credentials(&mut self.nvs, credentials) {
            warn!("Failed to store credentials: {:?}", e);
        }

        match self.join(credentials) {
            Ok(()) => {
                self.associated = true;
                self.pending
                    .push_back(DriverEvent::ConnectionChanged(LinkState::Up));
                Ok(())
            }
            Err(e) => {
                self.associated = false;
                self.pending
                    .push_back(DriverEvent::ConnectionChanged(LinkState::Down));
                Err(e)
            }
        }
    }

    fn request_connection_info(&mut self) -> Result<(), PlatformError> {
        match self.wifi.get_configuration()? {
            Configuration::Client(client) | Configuration::Mixed(client, _) => {
                self.pending.push_back(DriverEvent::ConnectionInfo {
                    ssid: client.ssid.to_string(),
                });
                Ok(())
            }
            _ => Err(PlatformError::Radio("not in station mode".into())),
        }
    }

    fn request_address(&mut self) -> Result<(), PlatformError> {
        if let Err(e) = self.wifi.wait_netif_up() {
            warn!("DHCP failed: {:?}", e);
            self.associated = false;
            self.pending
                .push_back(DriverEvent::ConnectionChanged(LinkState::Down));
            return Ok(());
        }
        let ip_info = self.wifi.wifi().sta_netif().get_ip_info()?;
        self.pending
            .push_back(DriverEvent::AddressAssigned(ip_info.ip));
        Ok(())
    }

    fn start_provisioning(
        &mut self,
        access_point: &AccessPointConfig,
    ) -> Result<SocketAddrV4, PlatformError> {
        self.associated = false;
        self.server = None;
        if self.wifi.is_started()? {
            self.wifi.stop()?;
        }

        let ap_config = Configuration::AccessPoint(AccessPointConfiguration {
            ssid: access_point
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| PlatformError::Radio("invalid access point SSID".into()))?,
            ssid_hidden: !access_point.visible,
            channel: access_point.channel + 1,
            auth_method: AuthMethod::None,
            ..Default::default()
        });
        self.wifi.set_configuration(&ap_config)?;
        self.wifi.start()?;
        self.wifi.wait_netif_up()?;

        let ip = self.wifi.wifi().ap_netif().get_ip_info()?.ip;
        info!("Access point '{}' up at {}", access_point.ssid, ip);

        let server = ProvisioningServer::start(None, access_point.port, &access_point.ssid)?;
        let page = SocketAddrV4::new(ip, server.port());
        self.server = Some(server);
        Ok(page)
    }

    fn stop_provisioning(&mut self) -> Result<(), PlatformError> {
        self.stop_access_point()
    }

    fn poll_events(&mut self) -> Vec<DriverEvent> {
        let submitted = self.server.as_ref().and_then(|s| s.try_result());
        if let Some(result) = submitted {
            if let ProvisionResult::Success(credentials) = &result {
                if let Err(e) = save_credentials(&mut self.nvs, credentials) {
                    warn!("Failed to store provisioned credentials: {:?}", e);
                }
            }
            if let Err(e) = self.stop_access_point() {
                warn!("Failed to stop access point: {}", e);
            }
            self.pending.push_back(DriverEvent::Provisioned(result));
        }

        if self.associated && !self.wifi.is_connected().unwrap_or(false) {
            self.associated = false;
            self.pending
                .push_back(DriverEvent::ConnectionChanged(LinkState::Down));
        }

        self.pending.drain(..).collect()
    }
}

fn auth_method(security: SecurityType) -> AuthMethod {
    match security {
        SecurityType::Open => AuthMethod::None,
        SecurityType::WpaPsk => AuthMethod::WPA2Personal,
        SecurityType::Wep => AuthMethod::WEP,
        SecurityType::Enterprise => AuthMethod::WPA2Enterprise,
    }
}
