/// Default DNS-SD service type browsed for devices
pub const DEFAULT_SERVICE_TYPE: &str = "_http._tcp";

/// Default mDNS search domain
pub const DEFAULT_DOMAIN: &str = "local";

/// Hostname substring identifying Shelly devices
pub const DEFAULT_NAME_FILTER: &str = "shelly";

/// Device HTTP endpoints
pub const STATUS_PATH: &str = "/status";
pub const SETTINGS_PATH: &str = "/settings";

/// Column titles of the report, in output order
pub const REPORT_COLUMNS: [&str; 8] = [
    "Hostname",
    "Url",
    "RSSI",
    "Temperature",
    "Network",
    "IP",
    "Subnet",
    "Gateway",
];

/// Field separator of the report
pub const REPORT_DELIMITER: char = ';';
