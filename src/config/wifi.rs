//! WiFi credential types and console-line parsing.
//!
//! Platform-independent, so everything here is tested on the host.
//!
//! # Example
//!
//! ```
//! use iot_sensor_node::config::{Credentials, SecurityType};
//!
//! let creds = Credentials::parse_console_line("MySSID:MyPass:2:5", &Credentials::fallback());
//! assert_eq!(creds.ssid, "MySSID");
//! assert_eq!(creds.security, SecurityType::WpaPsk);
//! assert_eq!(creds.channel, 4);
//! ```

use log::warn;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum passphrase length.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Channel value meaning "scan every channel".
pub const CHANNEL_ALL: u8 = 255;

/// Highest channel number accepted from the console (1-based).
pub const MAX_CHANNEL: u8 = 14;

const DEMO_SSID: &str = "DEMO_AP";
const DEMO_PASSWORD: &str = "12345678";

/// Build-time default SSID.
const DEFAULT_SSID: &str = match option_env!("WIFI_SSID") {
    Some(ssid) => ssid,
    None => DEMO_SSID,
};

/// Build-time default passphrase.
const DEFAULT_PASSWORD: &str = match option_env!("WIFI_PASSWORD") {
    Some(password) => password,
    None => DEMO_PASSWORD,
};

/// Security mode of the network to join.
///
/// Discriminants are the codes typed at the console prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SecurityType {
    Open = 1,
    WpaPsk = 2,
    Wep = 3,
    Enterprise = 4,
}

impl SecurityType {
    /// Console code for this security mode.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a console code. Codes outside `1..=4` are rejected.
    pub fn from_code(code: u8) -> Result<Self, ConfigError> {
        match code {
            1 => Ok(Self::Open),
            2 => Ok(Self::WpaPsk),
            3 => Ok(Self::Wep),
            4 => Ok(Self::Enterprise),
            other => Err(ConfigError::UnknownSecurity(other)),
        }
    }
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::WpaPsk => "WPA-PSK",
            Self::Wep => "WEP",
            Self::Enterprise => "WPA/WPA2 Enterprise",
        };
        write!(f, "{}", name)
    }
}

/// Credentials for joining an access point.
///
/// The passphrase is wiped from memory when the value is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    /// Network SSID (1-32 bytes).
    pub ssid: String,
    /// Passphrase, empty for open networks.
    pub password: String,
    /// Security mode.
    #[zeroize(skip)]
    pub security: SecurityType,
    /// Zero-indexed channel, or [`CHANNEL_ALL`].
    #[zeroize(skip)]
    pub channel: u8,
}

impl Credentials {
    /// Create validated credentials.
    pub fn new(
        ssid: impl Into<String>,
        password: impl Into<String>,
        security: SecurityType,
        channel: u8,
    ) -> Result<Self, ConfigError> {
        let creds = Self {
            ssid: ssid.into(),
            password: password.into(),
            security,
            channel,
        };
        creds.validate()?;
        Ok(creds)
    }

    /// The compiled-in default credentials.
    ///
    /// Invalid build-time values are replaced by the demo network.
    pub fn fallback() -> Self {
        Self::fallback_from(DEFAULT_SSID, DEFAULT_PASSWORD)
    }

    fn fallback_from(ssid: &str, password: &str) -> Self {
        let security = if password.is_empty() {
            SecurityType::Open
        } else {
            SecurityType::WpaPsk
        };
        match Self::new(ssid, password, security, CHANNEL_ALL) {
            Ok(creds) => creds,
            Err(e) => {
                warn!("Build-time WiFi credentials rejected ({}), using {}", e, DEMO_SSID);
                Self {
                    ssid: DEMO_SSID.to_string(),
                    password: DEMO_PASSWORD.to_string(),
                    security: SecurityType::WpaPsk,
                    channel: CHANNEL_ALL,
                }
            }
        }
    }

    /// Validate lengths and the channel index.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_ssid(&self.ssid)?;
        validate_password(&self.password)?;
        if self.channel != CHANNEL_ALL && self.channel >= MAX_CHANNEL {
            return Err(ConfigError::ChannelOutOfRange(self.channel));
        }
        Ok(())
    }

    /// Check if this is an open network.
    pub fn is_open(&self) -> bool {
        self.security == SecurityType::Open
    }

    /// Parse a console line of the form `SSID:PASSWORD:SECURITY:CHANNEL`.
    ///
    /// Each field is taken independently. A field that is missing, empty or
    /// invalid is replaced by the matching field of `defaults` and a warning
    /// is logged. Trailing line endings are ignored. The channel is entered
    /// 1-based and stored zero-indexed; `0` selects every channel.
    pub fn parse_console_line(line: &str, defaults: &Credentials) -> Self {
        let mut fields = line.trim_end_matches(['\r', '\n']).splitn(4, ':');
        let mut next = || fields.next().filter(|field| !field.is_empty());

        let ssid = match next() {
            Some(ssid) => match validate_ssid(ssid) {
                Ok(()) => ssid.to_string(),
                Err(e) => {
                    warn!("Ignoring SSID from console: {}", e);
                    defaults.ssid.clone()
                }
            },
            None => defaults.ssid.clone(),
        };

        let password = match next() {
            Some(password) => match validate_password(password) {
                Ok(()) => password.to_string(),
                Err(e) => {
                    warn!("Ignoring password from console: {}", e);
                    defaults.password.clone()
                }
            },
            None => defaults.password.clone(),
        };

        let security = match next() {
            Some(field) => match parse_security(field) {
                Ok(security) => security,
                Err(e) => {
                    warn!("{}, using {}", e, defaults.security);
                    defaults.security
                }
            },
            None => defaults.security,
        };

        let channel = match next() {
            Some(field) => match parse_channel(field) {
                Ok(channel) => channel,
                Err(e) => {
                    warn!("{}, using the default channel", e);
                    defaults.channel
                }
            },
            None => defaults.channel,
        };

        Self {
            ssid,
            password,
            security,
            channel,
        }
    }

    /// Serialize for non-volatile storage.
    ///
    /// Format: `[ssid_len][ssid][password_len][password][security][channel]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.ssid.len() + self.password.len());
        bytes.push(self.ssid.len() as u8);
        bytes.extend_from_slice(self.ssid.as_bytes());
        bytes.push(self.password.len() as u8);
        bytes.extend_from_slice(self.password.as_bytes());
        bytes.push(self.security.code());
        bytes.push(self.channel);
        bytes
    }

    /// Deserialize from bytes written by [`Credentials::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.is_empty() {
            return Err(ConfigError::InvalidFormat("empty data".into()));
        }

        let ssid_len = bytes[0] as usize;
        if bytes.len() < 1 + ssid_len + 1 {
            return Err(ConfigError::InvalidFormat("truncated SSID".into()));
        }
        let ssid = String::from_utf8(bytes[1..1 + ssid_len].to_vec())
            .map_err(|_| ConfigError::InvalidFormat("invalid SSID UTF-8".into()))?;

        let password_len = bytes[1 + ssid_len] as usize;
        let password_start = 2 + ssid_len;
        let tail = password_start + password_len;
        if bytes.len() < tail + 2 {
            return Err(ConfigError::InvalidFormat("truncated record".into()));
        }
        let password = String::from_utf8(bytes[password_start..tail].to_vec())
            .map_err(|_| ConfigError::InvalidFormat("invalid password UTF-8".into()))?;

        let security = SecurityType::from_code(bytes[tail])?;
        Self::new(ssid, password, security, bytes[tail + 1])
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &"****")
            .field("security", &self.security)
            .field("channel", &self.channel)
            .finish()
    }
}

fn validate_ssid(ssid: &str) -> Result<(), ConfigError> {
    if ssid.is_empty() {
        return Err(ConfigError::SsidEmpty);
    }
    if ssid.len() > MAX_SSID_LEN {
        return Err(ConfigError::SsidTooLong {
            len: ssid.len(),
            max: MAX_SSID_LEN,
        });
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConfigError> {
    if password.len() > MAX_PASSWORD_LEN {
        return Err(ConfigError::PasswordTooLong {
            len: password.len(),
            max: MAX_PASSWORD_LEN,
        });
    }
    Ok(())
}

fn parse_security(field: &str) -> Result<SecurityType, ConfigError> {
    let code = field
        .trim()
        .parse::<u8>()
        .map_err(|_| ConfigError::InvalidFormat(format!("security '{}' is not a number", field)))?;
    SecurityType::from_code(code)
}

fn parse_channel(field: &str) -> Result<u8, ConfigError> {
    let channel = field
        .trim()
        .parse::<u8>()
        .map_err(|_| ConfigError::InvalidFormat(format!("channel '{}' is not a number", field)))?;
    match channel {
        0 => Ok(CHANNEL_ALL),
        1..=MAX_CHANNEL => Ok(channel - 1),
        other => Err(ConfigError::ChannelOutOfRange(other)),
    }
}

/// Errors that can occur while building or parsing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// Security code outside the known range.
    UnknownSecurity(u8),
    /// Channel outside the valid range.
    ChannelOutOfRange(u8),
    /// Product name does not fit the record field or is not ASCII.
    InvalidProductName(String),
    /// A field could not be parsed.
    InvalidFormat(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::UnknownSecurity(code) => write!(f, "unknown security type {}", code),
            Self::ChannelOutOfRange(ch) => write!(f, "channel {} out of range", ch),
            Self::InvalidProductName(name) => write!(f, "invalid product name: {:?}", name),
            Self::InvalidFormat(msg) => write!(f, "invalid format: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
