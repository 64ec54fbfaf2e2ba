//! Loopback stand-ins for Shelly devices.

use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::get,
    Router,
};

pub const STATUS_JSON: &str = r#"{"wifi_sta":{"rssi":-50},"tmp":{"tC":22.3}}"#;
pub const SETTINGS_JSON: &str =
    r#"{"wifi_sta":{"ipv4_method":"dhcp","gw":"192.168.1.1","mask":"255.255.255.0"}}"#;

/// Response bodies served by a mock device, guarded by admin/admin
#[derive(Clone)]
pub struct MockDevice {
    pub status: String,
    pub settings: String,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self {
            status: STATUS_JSON.to_string(),
            settings: SETTINGS_JSON.to_string(),
        }
    }
}

// base64("admin:admin")
const EXPECTED_AUTH: &str = "Basic YWRtaW46YWRtaW4=";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some(EXPECTED_AUTH)
}

async fn status(State(device): State<Arc<MockDevice>>, headers: HeaderMap) -> (StatusCode, String) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, String::new());
    }
    (StatusCode::OK, device.status.clone())
}

async fn settings(State(device): State<Arc<MockDevice>>, headers: HeaderMap) -> (StatusCode, String) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, String::new());
    }
    (StatusCode::OK, device.settings.clone())
}

/// Serve `device` on an ephemeral loopback port
pub async fn spawn_device(device: MockDevice) -> SocketAddr {
    let app = Router::new()
        .route("/status", get(status))
        .route("/settings", get(settings))
        .with_state(Arc::new(device));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A loopback port with nothing listening on it
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
