use std::fmt;
use std::net::Ipv4Addr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde::de::DeserializeOwned;
use crate::protocol::{REPORT_COLUMNS, REPORT_DELIMITER};

/// A resolved mDNS browse hit.
/// Lives for the duration of one discovery cycle only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    /// Full DNS-SD instance name, e.g. "shelly1-ABCDEF._http._tcp.local."
    pub instance_name: String,

    /// Advertised hostname, e.g. "shelly1-ABCDEF.local."
    pub hostname: String,

    /// First resolved IPv4 address
    pub address: Ipv4Addr,
}

impl ServiceRecord {
    /// First label of the hostname, e.g. "shelly1-ABCDEF"
    pub fn short_hostname(&self) -> &str {
        self.hostname.split('.').next().unwrap_or_default()
    }
}

/// Decode a device field, falling back to its default when the device sends
/// `null` or a value of another type. One odd field must not cost the rest
/// of the document.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Decoded `/status` document. Missing, `null` or mistyped fields take their
/// default value and unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeviceStatus {
    #[serde(deserialize_with = "lenient")]
    pub wifi_sta: WifiStaStatus,
    #[serde(deserialize_with = "lenient")]
    pub cloud: CloudState,
    #[serde(deserialize_with = "lenient")]
    pub mqtt: MqttStatus,
    #[serde(deserialize_with = "lenient")]
    pub time: String,
    #[serde(deserialize_with = "lenient")]
    pub serial: i64,
    #[serde(deserialize_with = "lenient")]
    pub has_update: bool,
    #[serde(deserialize_with = "lenient")]
    pub mac: String,
    #[serde(deserialize_with = "lenient")]
    pub lights: Vec<LightStatus>,
    #[serde(deserialize_with = "lenient")]
    pub meters: Vec<MeterStatus>,
    #[serde(deserialize_with = "lenient")]
    pub inputs: Vec<InputStatus>,
    #[serde(deserialize_with = "lenient")]
    pub tmp: TemperatureReading,
    #[serde(deserialize_with = "lenient")]
    pub calib_progress: i64,
    #[serde(deserialize_with = "lenient")]
    pub overtemperature: bool,
    #[serde(deserialize_with = "lenient")]
    pub loaderror: bool,
    #[serde(deserialize_with = "lenient")]
    pub overload: bool,
    #[serde(deserialize_with = "lenient")]
    pub update: UpdateStatus,
    #[serde(deserialize_with = "lenient")]
    pub ram_total: u64,
    #[serde(deserialize_with = "lenient")]
    pub ram_free: u64,
    #[serde(deserialize_with = "lenient")]
    pub fs_size: u64,
    #[serde(deserialize_with = "lenient")]
    pub fs_free: u64,
    #[serde(deserialize_with = "lenient")]
    pub uptime: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WifiStaStatus {
    #[serde(deserialize_with = "lenient")]
    pub connected: bool,
    #[serde(deserialize_with = "lenient")]
    pub ssid: String,
    #[serde(deserialize_with = "lenient")]
    pub ip: String,
    #[serde(deserialize_with = "lenient")]
    pub rssi: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CloudState {
    #[serde(deserialize_with = "lenient")]
    pub enabled: bool,
    #[serde(deserialize_with = "lenient")]
    pub connected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MqttStatus {
    #[serde(deserialize_with = "lenient")]
    pub connected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LightStatus {
    #[serde(deserialize_with = "lenient")]
    pub ison: bool,
    #[serde(deserialize_with = "lenient")]
    pub mode: String,
    #[serde(deserialize_with = "lenient")]
    pub brightness: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MeterStatus {
    #[serde(deserialize_with = "lenient")]
    pub power: f64,
    #[serde(deserialize_with = "lenient")]
    pub is_valid: bool,
    #[serde(deserialize_with = "lenient")]
    pub timestamp: i64,
    #[serde(deserialize_with = "lenient")]
    pub counters: Vec<f64>,
    #[serde(deserialize_with = "lenient")]
    pub total: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct InputStatus {
    #[serde(deserialize_with = "lenient")]
    pub input: i64,
}

/// Internal temperature sensor. Devices without a sensor omit the block,
/// leaving `t_c` at zero.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TemperatureReading {
    #[serde(rename = "tC", deserialize_with = "lenient")]
    pub t_c: f64,
    #[serde(rename = "tF", deserialize_with = "lenient")]
    pub t_f: f64,
    #[serde(deserialize_with = "lenient")]
    pub is_valid: Option<Validity>,
}

/// Firmware generations disagree on whether `is_valid` is a boolean or text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Validity {
    Flag(bool),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UpdateStatus {
    #[serde(deserialize_with = "lenient")]
    pub status: String,
    #[serde(deserialize_with = "lenient")]
    pub has_update: bool,
    #[serde(deserialize_with = "lenient")]
    pub new_version: String,
    #[serde(deserialize_with = "lenient")]
    pub old_version: String,
}

/// Decoded `/settings` document, decoded as permissively as [`DeviceStatus`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    #[serde(deserialize_with = "lenient")]
    pub device: DeviceInfo,
    #[serde(deserialize_with = "lenient")]
    pub wifi_ap: WifiApSettings,
    #[serde(deserialize_with = "lenient")]
    pub wifi_sta: WifiStaSettings,
    #[serde(deserialize_with = "lenient")]
    pub wifi_sta1: SecondaryWifiStaSettings,
    #[serde(deserialize_with = "lenient")]
    pub mqtt: MqttSettings,
    #[serde(deserialize_with = "lenient")]
    pub sntp: SntpSettings,
    #[serde(deserialize_with = "lenient")]
    pub login: LoginSettings,
    #[serde(deserialize_with = "lenient")]
    pub pin_code: String,
    #[serde(deserialize_with = "lenient")]
    pub coiot_execute_enable: bool,
    #[serde(deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub fw: String,
    #[serde(deserialize_with = "lenient")]
    pub build_info: BuildInfo,
    #[serde(deserialize_with = "lenient")]
    pub cloud: CloudState,
    #[serde(deserialize_with = "lenient")]
    pub timezone: String,
    #[serde(deserialize_with = "lenient")]
    pub lat: f64,
    #[serde(deserialize_with = "lenient")]
    pub lng: f64,
    #[serde(deserialize_with = "lenient")]
    pub tzautodetect: bool,
    #[serde(deserialize_with = "lenient")]
    pub time: String,
    #[serde(deserialize_with = "lenient")]
    pub light_sensor: String,
    #[serde(deserialize_with = "lenient")]
    pub schedule: bool,
    #[serde(deserialize_with = "lenient")]
    pub schedule_rules: Vec<String>,
    #[serde(deserialize_with = "lenient")]
    pub sensors: SensorSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    #[serde(rename = "type", deserialize_with = "lenient")]
    pub kind: String,
    #[serde(deserialize_with = "lenient")]
    pub mac: String,
    #[serde(deserialize_with = "lenient")]
    pub hostname: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WifiApSettings {
    #[serde(deserialize_with = "lenient")]
    pub enabled: bool,
    #[serde(deserialize_with = "lenient")]
    pub ssid: String,
    #[serde(deserialize_with = "lenient")]
    pub key: String,
}

/// Primary station block. `ip` is empty under DHCP.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WifiStaSettings {
    #[serde(deserialize_with = "lenient")]
    pub enabled: bool,
    #[serde(deserialize_with = "lenient")]
    pub ssid: String,
    #[serde(deserialize_with = "lenient")]
    pub ipv4_method: String,
    #[serde(deserialize_with = "lenient")]
    pub ip: String,
    #[serde(deserialize_with = "lenient")]
    pub gw: String,
    #[serde(deserialize_with = "lenient")]
    pub mask: String,
    #[serde(deserialize_with = "lenient")]
    pub dns: String,
}

/// Fallback station block. Unconfigured devices report `null` for every
/// address field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SecondaryWifiStaSettings {
    #[serde(deserialize_with = "lenient")]
    pub enabled: bool,
    #[serde(deserialize_with = "lenient")]
    pub ssid: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub ipv4_method: String,
    #[serde(deserialize_with = "lenient")]
    pub ip: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub gw: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub mask: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub dns: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    #[serde(deserialize_with = "lenient")]
    pub enable: bool,
    #[serde(deserialize_with = "lenient")]
    pub server: String,
    #[serde(deserialize_with = "lenient")]
    pub user: String,
    #[serde(deserialize_with = "lenient")]
    pub reconnect_timeout_max: f64,
    #[serde(deserialize_with = "lenient")]
    pub reconnect_timeout_min: f64,
    #[serde(deserialize_with = "lenient")]
    pub clean_session: bool,
    #[serde(deserialize_with = "lenient")]
    pub keep_alive: i64,
    #[serde(deserialize_with = "lenient")]
    pub will_topic: String,
    #[serde(deserialize_with = "lenient")]
    pub will_message: String,
    #[serde(deserialize_with = "lenient")]
    pub max_qos: i64,
    #[serde(deserialize_with = "lenient")]
    pub retain: bool,
    #[serde(deserialize_with = "lenient")]
    pub update_period: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SntpSettings {
    #[serde(deserialize_with = "lenient")]
    pub server: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoginSettings {
    #[serde(deserialize_with = "lenient")]
    pub enabled: bool,
    #[serde(deserialize_with = "lenient")]
    pub unprotected: bool,
    #[serde(deserialize_with = "lenient")]
    pub username: String,
    #[serde(deserialize_with = "lenient")]
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BuildInfo {
    #[serde(deserialize_with = "lenient")]
    pub build_id: String,
    #[serde(deserialize_with = "lenient")]
    pub build_timestamp: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient")]
    pub build_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    #[serde(deserialize_with = "lenient")]
    pub motion_duration: i64,
    #[serde(deserialize_with = "lenient")]
    pub motion_led: bool,
    #[serde(deserialize_with = "lenient")]
    pub temperature_unit: String,
}

/// One report line. Field order is fixed and matches [`REPORT_COLUMNS`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputRow {
    pub hostname: String,
    pub url: String,
    pub rssi: String,
    pub temperature: String,
    pub network: String,
    /// Address prefixed with a literal tab, kept for spreadsheet consumers
    pub ip: String,
    pub subnet: String,
    pub gateway: String,
}

impl OutputRow {
    pub fn fields(&self) -> [&str; 8] {
        [
            &self.hostname,
            &self.url,
            &self.rssi,
            &self.temperature,
            &self.network,
            &self.ip,
            &self.subnet,
            &self.gateway,
        ]
    }
}

impl fmt::Display for OutputRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_line(&self.fields()))
    }
}

/// Header line of the report
pub fn header_line() -> String {
    render_line(&REPORT_COLUMNS)
}

/// Quote every field and join with the report delimiter.
/// Embedded quotes are doubled.
fn render_line(fields: &[&str]) -> String {
    let quoted: Vec<String> = fields
        .iter()
        .map(|field| format!("\"{}\"", field.replace('"', "\"\"")))
        .collect();
    quoted.join(&REPORT_DELIMITER.to_string())
}
