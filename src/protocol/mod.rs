//! Datagram records exchanged with the collection server.
//!
//! Both records start with two identifier bytes followed by a 9-byte,
//! NUL-padded product name:
//!
//! ```text
//! Keepalive (12 bytes):     [0x00][0x01][name: 9][type: 1]
//! Sensor report (16 bytes): [0x00][0x02][name: 9][led: 1][temperature: i32 LE]
//! ```
//!
//! The temperature is carried in hundredths of a degree Celsius.
//!
//! # Example
//!
//! ```
//! use iot_sensor_node::protocol::{ProductName, SensorReport};
//!
//! let name = ProductName::new("Temp1").unwrap();
//! let report = SensorReport::new(name.clone(), true, 2150);
//! let bytes = report.encode();
//! assert_eq!(SensorReport::decode(&bytes, &name).unwrap(), report);
//! ```

use crate::config::ConfigError;
use std::fmt;

/// Size of the product name field, including the terminating NUL.
pub const PRODUCT_NAME_FIELD_LEN: usize = 9;

/// Longest product name that still leaves room for the terminator.
pub const MAX_PRODUCT_NAME_LEN: usize = PRODUCT_NAME_FIELD_LEN - 1;

/// Identifier bytes of a keepalive record.
pub const KEEPALIVE_ID: [u8; 2] = [0x00, 0x01];

/// Identifier bytes of a sensor report.
pub const REPORT_ID: [u8; 2] = [0x00, 0x02];

/// Device type announced in keepalive records (temperature sensor).
pub const DEVICE_TYPE_TEMPERATURE: u8 = 2;

/// Encoded keepalive length.
pub const KEEPALIVE_LEN: usize = 2 + PRODUCT_NAME_FIELD_LEN + 1;

/// Encoded sensor report length.
pub const REPORT_LEN: usize = 2 + PRODUCT_NAME_FIELD_LEN + 1 + 4;

/// Product name embedded in every record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductName([u8; PRODUCT_NAME_FIELD_LEN]);

impl ProductName {
    /// Create a product name. Must be 1-8 ASCII bytes without NUL.
    pub fn new(name: &str) -> Result<Self, ConfigError> {
        if name.is_empty()
            || name.len() > MAX_PRODUCT_NAME_LEN
            || !name.is_ascii()
            || name.contains('\0')
        {
            return Err(ConfigError::InvalidProductName(name.to_string()));
        }
        let mut field = [0u8; PRODUCT_NAME_FIELD_LEN];
        field[..name.len()].copy_from_slice(name.as_bytes());
        Ok(Self(field))
    }

    /// The raw, NUL-padded field.
    pub fn as_field(&self) -> &[u8; PRODUCT_NAME_FIELD_LEN] {
        &self.0
    }

    /// The name without padding.
    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(self.0.len());
        // Constructed from ASCII only.
        std::str::from_utf8(&self.0[..end]).unwrap_or_default()
    }

    /// Compare against a received name field (NUL-terminated string semantics).
    fn matches_field(&self, field: &[u8]) -> bool {
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        &field[..end] == self.as_str().as_bytes()
    }
}

impl Default for ProductName {
    /// The stock product name, [`DEFAULT_PRODUCT_NAME`](crate::config::DEFAULT_PRODUCT_NAME).
    fn default() -> Self {
        Self(*b"Temp1\0\0\0\0")
    }
}

impl fmt::Display for ProductName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identification frame announcing the device's presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepaliveRecord {
    pub product: ProductName,
    pub device_type: u8,
}

impl KeepaliveRecord {
    /// Keepalive for a temperature sensor.
    pub fn new(product: ProductName) -> Self {
        Self {
            product,
            device_type: DEVICE_TYPE_TEMPERATURE,
        }
    }

    pub fn encode(&self) -> [u8; KEEPALIVE_LEN] {
        let mut out = [0u8; KEEPALIVE_LEN];
        out[..2].copy_from_slice(&KEEPALIVE_ID);
        out[2..2 + PRODUCT_NAME_FIELD_LEN].copy_from_slice(self.product.as_field());
        out[KEEPALIVE_LEN - 1] = self.device_type;
        out
    }
}

/// Periodic sensor reading with the status LED flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorReport {
    pub product: ProductName,
    /// Status flag; the LED state on the device.
    pub led_on: bool,
    /// Temperature in hundredths of a degree Celsius.
    pub centi_celsius: i32,
}

impl SensorReport {
    pub fn new(product: ProductName, led_on: bool, centi_celsius: i32) -> Self {
        Self {
            product,
            led_on,
            centi_celsius,
        }
    }

    /// Build a report from a reading in degrees Celsius.
    pub fn from_celsius(product: ProductName, led_on: bool, celsius: f32) -> Self {
        Self::new(product, led_on, (celsius * 100.0).round() as i32)
    }

    pub fn encode(&self) -> [u8; REPORT_LEN] {
        let mut out = [0u8; REPORT_LEN];
        out[..2].copy_from_slice(&REPORT_ID);
        out[2..11].copy_from_slice(self.product.as_field());
        out[11] = u8::from(self.led_on);
        out[12..16].copy_from_slice(&self.centi_celsius.to_le_bytes());
        out
    }

    /// Decode a report addressed to `product`.
    ///
    /// Datagrams longer than a report are accepted; the tail is ignored.
    pub fn decode(bytes: &[u8], product: &ProductName) -> Result<Self, ProtocolError> {
        if bytes.len() < REPORT_LEN {
            return Err(ProtocolError::TooShort {
                len: bytes.len(),
                min: REPORT_LEN,
            });
        }
        if bytes[..2] != REPORT_ID {
            return Err(ProtocolError::UnexpectedId([bytes[0], bytes[1]]));
        }
        if !product.matches_field(&bytes[2..11]) {
            return Err(ProtocolError::ForeignProduct);
        }
        let mut temp = [0u8; 4];
        temp.copy_from_slice(&bytes[12..16]);
        Ok(Self {
            product: product.clone(),
            led_on: bytes[11] != 0,
            centi_celsius: i32::from_le_bytes(temp),
        })
    }
}

/// Errors decoding inbound records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Datagram shorter than the record.
    TooShort { len: usize, min: usize },
    /// Identifier bytes do not name a sensor report.
    UnexpectedId([u8; 2]),
    /// Record is for another product.
    ForeignProduct,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len, min } => {
                write!(f, "datagram too short: {} bytes (need {})", len, min)
            }
            Self::UnexpectedId(id) => write!(f, "unexpected record id {:02x}{:02x}", id[0], id[1]),
            Self::ForeignProduct => write!(f, "record addressed to another product"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn name() -> ProductName {
        ProductName::new("Temp1").unwrap()
    }

    #[test]
    fn test_product_name_padding() {
        let name = name();
        assert_eq!(name.as_field(), b"Temp1\0\0\0\0");
        assert_eq!(name.as_str(), "Temp1");
    }

    #[test]
    fn test_product_name_limits() {
        assert!(ProductName::new("12345678").is_ok());
        assert!(ProductName::new("123456789").is_err());
        assert!(ProductName::new("").is_err());
        assert!(ProductName::new("tëmp").is_err());
    }

    #[test]
    fn test_keepalive_layout() {
        let bytes = KeepaliveRecord::new(name()).encode();
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[..2], &[0x00, 0x01]);
        assert_eq!(&bytes[2..11], b"Temp1\0\0\0\0");
        assert_eq!(bytes[11], 2);
    }

    #[test]
    fn test_report_layout() {
        let bytes = SensorReport::new(name(), true, 2345).encode();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..2], &[0x00, 0x02]);
        assert_eq!(&bytes[2..11], b"Temp1\0\0\0\0");
        assert_eq!(bytes[11], 1);
        assert_eq!(&bytes[12..], &2345i32.to_le_bytes());
    }

    #[test]
    fn test_report_negative_temperature() {
        let report = SensorReport::from_celsius(name(), false, -4.25);
        assert_eq!(report.centi_celsius, -425);
        let decoded = SensorReport::decode(&report.encode(), &name()).unwrap();
        assert_eq!(decoded.centi_celsius, -425);
        assert!(!decoded.led_on);
    }

    #[test]
    fn test_decode_rejects_short() {
        let result = SensorReport::decode(&[0, 2, b'T'], &name());
        assert_eq!(result, Err(ProtocolError::TooShort { len: 3, min: 16 }));
    }

    #[test]
    fn test_decode_rejects_keepalive_id() {
        let mut bytes = SensorReport::new(name(), true, 0).encode();
        bytes[1] = 0x01;
        assert_eq!(
            SensorReport::decode(&bytes, &name()),
            Err(ProtocolError::UnexpectedId([0, 1]))
        );
    }

    #[test]
    fn test_decode_rejects_other_product() {
        let other = ProductName::new("Temp2").unwrap();
        let bytes = SensorReport::new(other, true, 0).encode();
        assert_eq!(
            SensorReport::decode(&bytes, &name()),
            Err(ProtocolError::ForeignProduct)
        );
    }

    #[test]
    fn test_decode_rejects_prefix_product() {
        let longer = ProductName::new("Temp10").unwrap();
        let bytes = SensorReport::new(longer, true, 0).encode();
        assert_eq!(
            SensorReport::decode(&bytes, &name()),
            Err(ProtocolError::ForeignProduct)
        );
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut bytes = SensorReport::new(name(), true, 100).encode().to_vec();
        bytes.extend_from_slice(&[0xAA; 8]);
        let report = SensorReport::decode(&bytes, &name()).unwrap();
        assert!(report.led_on);
        assert_eq!(report.centi_celsius, 100);
    }
}
