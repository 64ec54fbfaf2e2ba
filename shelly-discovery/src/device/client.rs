use std::future::Future;
use std::net::Ipv4Addr;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use shared::protocol::{SETTINGS_PATH, STATUS_PATH};
use shared::types::{DeviceSettings, DeviceStatus};
use crate::config::DeviceConfig;

/// Failure to obtain one document from a device
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with {status}")]
    Status { url: String, status: StatusCode },

    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of querying a device. Each document succeeds or fails on its own.
#[derive(Debug)]
pub struct DeviceReport {
    pub status: Result<DeviceStatus, QueryError>,
    pub settings: Result<DeviceSettings, QueryError>,
}

impl DeviceReport {
    pub fn is_complete(&self) -> bool {
        self.status.is_ok() && self.settings.is_ok()
    }

    pub fn errors(&self) -> impl Iterator<Item = &QueryError> {
        self.status.as_ref().err().into_iter().chain(self.settings.as_ref().err())
    }

    /// Both documents, zero-valued where the fetch failed
    pub fn into_documents(self) -> (DeviceStatus, DeviceSettings) {
        (self.status.unwrap_or_default(), self.settings.unwrap_or_default())
    }
}

/// Source of device documents, keyed by address
pub trait DeviceQuery {
    fn query(&self, address: Ipv4Addr) -> impl Future<Output = DeviceReport> + Send;
}

/// Basic-auth HTTP client for the Shelly Gen1 API
#[derive(Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    user: String,
    password: String,
    port: u16,
}

impl DeviceClient {
    pub fn new(config: &DeviceConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            user: config.user.clone(),
            password: config.password.clone(),
            port: config.port,
        })
    }

    pub async fn fetch_status(&self, address: Ipv4Addr) -> Result<DeviceStatus, QueryError> {
        self.fetch(address, STATUS_PATH).await
    }

    pub async fn fetch_settings(&self, address: Ipv4Addr) -> Result<DeviceSettings, QueryError> {
        self.fetch(address, SETTINGS_PATH).await
    }

    fn url(&self, address: Ipv4Addr, path: &str) -> String {
        if self.port == 80 {
            format!("http://{}{}", address, path)
        } else {
            format!("http://{}:{}{}", address, self.port, path)
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, address: Ipv4Addr, path: &str) -> Result<T, QueryError> {
        let url = self.url(address, path);

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .map_err(|source| QueryError::Transport { url: url.clone(), source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueryError::Status { url, status });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| QueryError::Transport { url: url.clone(), source })?;

        serde_json::from_slice(&body).map_err(|source| QueryError::Decode { url, source })
    }
}

impl DeviceQuery for DeviceClient {
    async fn query(&self, address: Ipv4Addr) -> DeviceReport {
        let status = self.fetch_status(address).await;
        let settings = self.fetch_settings(address).await;
        DeviceReport { status, settings }
    }
}
