//! HTTP access to discovered devices.

pub mod client;

pub use client::{DeviceClient, DeviceQuery, DeviceReport, QueryError};
