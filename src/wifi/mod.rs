//! ESP32 WiFi driver and credential storage.
//!
//! # Components
//!
//! - [`EspRadio`] - [`RadioDriver`](crate::platform::RadioDriver) over the
//!   ESP-IDF WiFi driver
//! - `storage` - NVS persistence for the last joined network
//!
//! Credential types and validation live in [`crate::config`].

mod connection;
mod storage;

pub use connection::EspRadio;
pub use storage::{init_nvs, load_credentials, save_credentials};
