//! Row formatting for the discovery report.

use std::net::Ipv4Addr;
use shared::types::{DeviceSettings, DeviceStatus, OutputRow};

/// Two decimals; a reading that rounds to "0.00" means no sensor and renders empty.
pub fn format_temperature(celsius: f64) -> String {
    let rendered = format!("{:.2}", celsius);
    if rendered == "0.00" {
        String::new()
    } else {
        rendered
    }
}

pub fn format_row(
    hostname: &str,
    address: Ipv4Addr,
    status: &DeviceStatus,
    settings: &DeviceSettings,
) -> OutputRow {
    let wifi = &settings.wifi_sta;
    OutputRow {
        hostname: hostname.to_string(),
        url: format!("http://{}", address),
        rssi: status.wifi_sta.rssi.to_string(),
        temperature: format_temperature(status.tmp.t_c),
        network: wifi.ipv4_method.clone(),
        ip: format!("\t{}", address),
        subnet: wifi.mask.clone(),
        gateway: wifi.gw.clone(),
    }
}
