//! Command-line arguments.
//!
//! Every option is optional so that unset flags fall through to the config
//! file and then to built-in defaults.

use std::path::PathBuf;
use clap::Parser;
use crate::config::RowPolicy;

/// Discover Shelly devices via mDNS and print their network settings
#[derive(Parser, Debug, Default)]
#[command(name = "shelly-discovery")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// TOML config file
    #[arg(long, env = "SHELLY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Service category to look for devices
    #[arg(long, env = "SHELLY_SERVICE")]
    pub service: Option<String>,

    /// Search domain. For local networks the default is fine
    #[arg(long, env = "SHELLY_DOMAIN")]
    pub domain: Option<String>,

    /// Duration in seconds to run discovery
    #[arg(long, env = "SHELLY_WAIT")]
    pub wait: Option<u64>,

    /// Username for the Shelly devices
    #[arg(long, env = "SHELLY_USER")]
    pub user: Option<String>,

    /// Password for the Shelly devices
    #[arg(long, env = "SHELLY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Hostname substring a device must contain
    #[arg(long, env = "SHELLY_FILTER")]
    pub filter: Option<String>,

    /// What to do with devices whose status or settings cannot be read
    #[arg(long, value_enum, env = "SHELLY_ON_ERROR")]
    pub on_error: Option<RowPolicy>,

    /// HTTP port of the devices
    #[arg(long, env = "SHELLY_HTTP_PORT")]
    pub port: Option<u16>,

    /// Per-request HTTP timeout in seconds (no timeout when unset)
    #[arg(long, env = "SHELLY_HTTP_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Repeat discovery every N minutes instead of exiting after one cycle
    #[arg(long, env = "SHELLY_EVERY")]
    pub every: Option<u64>,
}
