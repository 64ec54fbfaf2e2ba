use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use anyhow::{Context, Result};
use shared::types::ServiceRecord;

/// Start browsing a fully-qualified service type, e.g. "_http._tcp.local."
pub fn start_browse(daemon: &ServiceDaemon, service_type: &str) -> Result<flume::Receiver<ServiceEvent>> {
    daemon
        .browse(service_type)
        .with_context(|| format!("Failed to browse {}", service_type))
}

/// Start browsing `service_type` and forward records as [`run_browser`] does.
/// Fails without forwarding anything if the browse cannot be started.
pub async fn browse(
    daemon: ServiceDaemon,
    service_type: String,
    tx: mpsc::Sender<ServiceRecord>,
    deadline: Instant,
    cancel: CancellationToken,
) -> Result<usize> {
    let events = start_browse(&daemon, &service_type)?;
    run_browser(events, tx, deadline, cancel).await
}

/// Forward each newly resolved instance to `tx` until the deadline passes,
/// `cancel` fires or the daemon drops the browse. Returns the number of
/// records forwarded. `tx` is dropped on return, closing the stream.
pub async fn run_browser(
    events: flume::Receiver<ServiceEvent>,
    tx: mpsc::Sender<ServiceRecord>,
    deadline: Instant,
    cancel: CancellationToken,
) -> Result<usize> {
    tracing::debug!("mDNS browser started");

    // mdns-sd re-announces an instance whenever its records change
    let mut resolved = HashSet::new();
    let mut forwarded = 0usize;

    loop {
        tokio::select! {
            event = events.recv_async() => {
                match event {
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        if !resolved.insert(info.get_fullname().to_string()) {
                            continue;
                        }
                        let Some(record) = convert_service_info(&info) else {
                            continue;
                        };
                        tracing::debug!(
                            "Resolved {} at {}",
                            record.instance_name,
                            record.address
                        );
                        if tx.send(record).await.is_err() {
                            tracing::debug!("Record consumer gone, stopping browser");
                            break;
                        }
                        forwarded += 1;
                    }
                    Ok(ServiceEvent::ServiceRemoved(_typ, fullname)) => {
                        tracing::debug!("Service removed: {}", fullname);
                    }
                    Ok(ServiceEvent::SearchStopped(typ)) => {
                        tracing::debug!("Search stopped for {}", typ);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("mDNS browse receiver disconnected: {}", e);
                        break;
                    }
                }
            }

            _ = sleep_until(deadline) => {
                tracing::debug!("Browse window elapsed");
                break;
            }

            _ = cancel.cancelled() => {
                tracing::debug!("mDNS browser cancelled");
                break;
            }
        }
    }

    Ok(forwarded)
}

/// Convert an mdns-sd ServiceInfo to a ServiceRecord. Services without an
/// IPv4 address cannot be queried and are dropped.
fn convert_service_info(info: &ServiceInfo) -> Option<ServiceRecord> {
    let address: Option<Ipv4Addr> = info
        .get_addresses()
        .iter()
        .filter_map(|addr| match addr {
            IpAddr::V4(ipv4) => Some(*ipv4),
            _ => None,
        })
        .min();

    let Some(address) = address else {
        tracing::debug!("Skipping service {} - no IPv4 address", info.get_fullname());
        return None;
    };

    Some(ServiceRecord {
        instance_name: info.get_fullname().to_string(),
        hostname: info.get_hostname().to_string(),
        address,
    })
}
