//! NVS persistence for WiFi credentials.
//!
//! Stores the last joined network in ESP32's Non-Volatile Storage (NVS) so
//! the node can resume it after a reboot.

use crate::config::{Credentials, MAX_PASSWORD_LEN, MAX_SSID_LEN};
use esp_idf_svc::nvs::{EspNvs, NvsDefault};
use esp_idf_sys::EspError;

/// NVS namespace for WiFi configuration.
const NVS_NAMESPACE: &str = "wifi_config";

/// NVS key for stored credentials.
const NVS_KEY: &str = "credentials";

/// Format: [ssid_len:1][ssid:32][password_len:1][password:64][security:1][channel:1].
const MAX_RECORD_LEN: usize = 1 + MAX_SSID_LEN + 1 + MAX_PASSWORD_LEN + 2;

/// Load stored credentials.
///
/// Returns `None` if nothing is stored or the record is corrupted.
pub fn load_credentials(nvs: &EspNvs<NvsDefault>) -> Option<Credentials> {
    let mut buf = [0u8; MAX_RECORD_LEN];
    let bytes = nvs.get_raw(NVS_KEY, &mut buf).ok()??;
    Credentials::from_bytes(bytes).ok()
}

/// Store credentials, replacing any previous record.
pub fn save_credentials(
    nvs: &mut EspNvs<NvsDefault>,
    credentials: &Credentials,
) -> Result<(), EspError> {
    let bytes = zeroize::Zeroizing::new(credentials.to_bytes());
    nvs.set_raw(NVS_KEY, &bytes)?;
    Ok(())
}

/// Open the credentials namespace on the default partition.
pub fn init_nvs() -> Result<EspNvs<NvsDefault>, EspError> {
    use esp_idf_svc::nvs::EspNvsPartition;
    let partition = EspNvsPartition::<NvsDefault>::take()?;
    EspNvs::new(partition, NVS_NAMESPACE, true)
}
