use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::{DEFAULT_DOMAIN, DEFAULT_NAME_FILTER, DEFAULT_SERVICE_TYPE};
use crate::cli::Args;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default = "default_wait")]
    pub wait_secs: u64,
    #[serde(default = "default_name_filter")]
    pub name_filter: String,
    #[serde(default)]
    pub on_error: RowPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    /// No timeout when unset
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleConfig {
    /// Run a single cycle when unset
    #[serde(default)]
    pub every_mins: Option<u64>,
}

/// Row emission for devices whose documents could not be fetched or decoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RowPolicy {
    /// Print the row with zero-valued fields for the failed documents
    #[default]
    Emit,
    /// Log the failure and print nothing
    Skip,
}

fn default_service() -> String {
    DEFAULT_SERVICE_TYPE.to_string()
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

fn default_wait() -> u64 {
    90
}

fn default_name_filter() -> String {
    DEFAULT_NAME_FILTER.to_string()
}

fn default_user() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "admin".to_string()
}

fn default_http_port() -> u16 {
    80
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service: default_service(),
            domain: default_domain(),
            wait_secs: default_wait(),
            name_filter: default_name_filter(),
            on_error: RowPolicy::default(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            password: default_password(),
            port: default_http_port(),
            timeout_secs: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    /// Fully-qualified DNS-SD type, e.g. "_http._tcp.local."
    pub fn service_type(&self) -> String {
        format!(
            "{}.{}.",
            self.service.trim_end_matches('.'),
            self.domain.trim_matches('.')
        )
    }
}

impl DeviceConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Option<Duration> {
        self.every_mins.map(|mins| Duration::from_secs(mins * 60))
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Build the effective configuration: command line over config file over defaults
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    fn apply_args(&mut self, args: &Args) {
        let discovery = &mut self.discovery;
        if let Some(service) = &args.service {
            discovery.service = service.clone();
        }
        if let Some(domain) = &args.domain {
            discovery.domain = domain.clone();
        }
        if let Some(wait) = args.wait {
            discovery.wait_secs = wait;
        }
        if let Some(filter) = &args.filter {
            discovery.name_filter = filter.clone();
        }
        if let Some(policy) = args.on_error {
            discovery.on_error = policy;
        }

        let device = &mut self.device;
        if let Some(user) = &args.user {
            device.user = user.clone();
        }
        if let Some(password) = &args.password {
            device.password = password.clone();
        }
        if let Some(port) = args.port {
            device.port = port;
        }
        if args.timeout.is_some() {
            device.timeout_secs = args.timeout;
        }

        if args.every.is_some() {
            self.schedule.every_mins = args.every;
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.discovery.service.is_empty(), "service type must not be empty");
        anyhow::ensure!(!self.discovery.domain.is_empty(), "search domain must not be empty");
        anyhow::ensure!(self.discovery.wait_secs > 0, "wait must be at least one second");
        if let Some(mins) = self.schedule.every_mins {
            anyhow::ensure!(mins > 0, "repeat interval must be at least one minute");
        }
        Ok(())
    }
}
