//! One discovery cycle: browse, enrich matching devices, print the report.

use std::io::Write;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use mdns_sd::ServiceDaemon;
use anyhow::{Context, Result};
use shared::types::{header_line, ServiceRecord};
use crate::config::{Config, DiscoveryConfig, RowPolicy};
use crate::device::{DeviceClient, DeviceQuery};
use crate::mdns::browser::browse;
use crate::report::format_row;

const RECORD_CHANNEL_CAPACITY: usize = 256;

/// Counters for one finished cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    /// Records received from the browser
    pub seen: usize,
    /// Records whose hostname matched the filter
    pub matched: usize,
    /// Rows written
    pub emitted: usize,
    /// Matched devices with at least one failed document
    pub failed: usize,
    /// Records still queued when the browse window closed
    pub pending: usize,
}

/// Browse once for `config.discovery.wait()` and write the report to `out`.
/// The header does not wait for the browse to start. A browse that cannot
/// start is an error after the empty report is closed; device failures are not.
pub async fn discover_once<W: Write>(
    config: &Config,
    daemon: &ServiceDaemon,
    devices: &DeviceClient,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<CycleSummary> {
    let service_type = config.discovery.service_type();
    tracing::info!(
        "Shelly mDNS discovery in progress ({} for {}s)",
        service_type,
        config.discovery.wait_secs
    );

    let deadline = Instant::now() + config.discovery.wait();

    // run_cycle writes the header straight away, while the browse is still starting
    let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
    let browser = tokio::spawn(browse(
        daemon.clone(),
        service_type.clone(),
        tx,
        deadline,
        cancel.child_token(),
    ));

    let result = report_browse(&config.discovery, browser, rx, deadline, devices, out).await;

    if let Err(e) = daemon.stop_browse(&service_type) {
        tracing::warn!("Failed to stop browsing {}: {}", service_type, e);
    }

    result
}

/// Run the cycle over a spawned browser's records, then surface the browser's own error
async fn report_browse<Q, W>(
    config: &DiscoveryConfig,
    browser: JoinHandle<Result<usize>>,
    records: mpsc::Receiver<ServiceRecord>,
    deadline: Instant,
    devices: &Q,
    out: &mut W,
) -> Result<CycleSummary>
where
    Q: DeviceQuery,
    W: Write,
{
    let summary = run_cycle(config, records, deadline, devices, out).await?;

    let forwarded = browser.await.context("mDNS browser task failed")??;
    tracing::debug!("Browser forwarded {} record(s)", forwarded);

    Ok(summary)
}

/// Consume `records` in arrival order until the stream closes or `deadline`
/// passes, writing the header, one row per matching device and a trailing
/// blank line. A device query already running at the deadline is awaited.
pub async fn run_cycle<Q, W>(
    config: &DiscoveryConfig,
    mut records: mpsc::Receiver<ServiceRecord>,
    deadline: Instant,
    devices: &Q,
    out: &mut W,
) -> Result<CycleSummary>
where
    Q: DeviceQuery,
    W: Write,
{
    let mut summary = CycleSummary::default();

    writeln!(out, "{}", header_line()).context("Failed to write report header")?;
    out.flush().context("Failed to flush report")?;

    loop {
        if Instant::now() >= deadline {
            break;
        }
        let record = tokio::select! {
            biased;
            _ = sleep_until(deadline) => break,
            record = records.recv() => match record {
                Some(record) => record,
                None => break,
            },
        };
        summary.seen += 1;

        let hostname = record.short_hostname();
        if !hostname.contains(config.name_filter.as_str()) {
            tracing::trace!("Ignoring {}", record.instance_name);
            continue;
        }
        summary.matched += 1;

        let report = devices.query(record.address).await;
        if !report.is_complete() {
            summary.failed += 1;
            for error in report.errors() {
                tracing::warn!("{} ({}): {}", hostname, record.address, error);
            }
            if config.on_error == RowPolicy::Skip {
                continue;
            }
        }

        let (status, settings) = report.into_documents();
        let row = format_row(hostname, record.address, &status, &settings);
        writeln!(out, "{}", row).context("Failed to write report row")?;
        out.flush().context("Failed to flush report")?;
        summary.emitted += 1;
    }

    records.close();
    while records.try_recv().is_ok() {
        summary.pending += 1;
    }

    writeln!(out).context("Failed to write report trailer")?;
    out.flush().context("Failed to flush report")?;

    tracing::info!(
        "mDNS discovery finished: {} service(s) seen, {} device(s) matched, {} row(s) written, {} failed",
        summary.seen,
        summary.matched,
        summary.emitted,
        summary.failed
    );
    if summary.pending > 0 {
        tracing::warn!("{} record(s) still queued when the browse window closed", summary.pending);
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;
    use std::time::Duration;
    use reqwest::StatusCode;
    use shared::types::{DeviceSettings, DeviceStatus};
    use crate::config::DeviceConfig;
    use crate::device::{DeviceReport, QueryError};
    use crate::testing::{closed_port, spawn_device, MockDevice, SETTINGS_JSON, STATUS_JSON};

    const SHELLY_ROW: &str = "\"shelly1-ABCDEF\";\"http://192.168.1.10\";\"-50\";\"22.30\";\"dhcp\";\"\t192.168.1.10\";\"255.255.255.0\";\"192.168.1.1\"";

    /// Answers from canned documents; unknown addresses fail with 503
    #[derive(Default)]
    struct CannedDevices {
        documents: HashMap<Ipv4Addr, (DeviceStatus, DeviceSettings)>,
        queried: Mutex<Vec<Ipv4Addr>>,
    }

    impl CannedDevices {
        fn with(mut self, address: Ipv4Addr, status: &str, settings: &str) -> Self {
            let documents = (
                serde_json::from_str(status).unwrap(),
                serde_json::from_str(settings).unwrap(),
            );
            self.documents.insert(address, documents);
            self
        }

        fn queried(&self) -> Vec<Ipv4Addr> {
            self.queried.lock().unwrap().clone()
        }
    }

    fn unavailable(address: Ipv4Addr, path: &str) -> QueryError {
        QueryError::Status {
            url: format!("http://{}{}", address, path),
            status: StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    impl DeviceQuery for CannedDevices {
        async fn query(&self, address: Ipv4Addr) -> DeviceReport {
            self.queried.lock().unwrap().push(address);
            match self.documents.get(&address) {
                Some((status, settings)) => DeviceReport {
                    status: Ok(status.clone()),
                    settings: Ok(settings.clone()),
                },
                None => DeviceReport {
                    status: Err(unavailable(address, "/status")),
                    settings: Err(unavailable(address, "/settings")),
                },
            }
        }
    }

    fn record(hostname: &str, address: Ipv4Addr) -> ServiceRecord {
        let label = hostname.split('.').next().unwrap();
        ServiceRecord {
            instance_name: format!("{}._http._tcp.local.", label),
            hostname: hostname.to_string(),
            address,
        }
    }

    /// A closed stream holding `records`
    fn stream(records: Vec<ServiceRecord>) -> mpsc::Receiver<ServiceRecord> {
        let (tx, rx) = mpsc::channel(records.len().max(1));
        for record in records {
            tx.try_send(record).unwrap();
        }
        rx
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    fn lines(out: &[u8]) -> Vec<String> {
        String::from_utf8(out.to_vec())
            .unwrap()
            .split('\n')
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_only_shelly_devices_are_reported() {
        let shelly = Ipv4Addr::new(192, 168, 1, 10);
        let workstation = Ipv4Addr::new(192, 168, 1, 20);
        let devices = CannedDevices::default().with(shelly, STATUS_JSON, SETTINGS_JSON);
        let records = stream(vec![
            record("shelly1-ABCDEF.local.", shelly),
            record("workstation.local.", workstation),
        ]);

        let mut out = Vec::new();
        let summary = run_cycle(&DiscoveryConfig::default(), records, far_deadline(), &devices, &mut out)
            .await
            .unwrap();

        assert_eq!(lines(&out), vec![header_line(), SHELLY_ROW.to_string(), String::new(), String::new()]);
        assert_eq!(devices.queried(), vec![shelly]);
        assert_eq!(
            summary,
            CycleSummary { seen: 2, matched: 1, emitted: 1, failed: 0, pending: 0 }
        );
    }

    #[tokio::test]
    async fn test_name_filter_is_case_sensitive() {
        let devices = CannedDevices::default();
        let records = stream(vec![record("Shelly-plug.local.", Ipv4Addr::new(10, 0, 0, 3))]);

        let mut out = Vec::new();
        let summary = run_cycle(&DiscoveryConfig::default(), records, far_deadline(), &devices, &mut out)
            .await
            .unwrap();

        assert_eq!(summary.matched, 0);
        assert!(devices.queried().is_empty());
        assert_eq!(lines(&out), vec![header_line(), String::new(), String::new()]);
    }

    #[tokio::test]
    async fn test_failed_device_emits_zero_row_by_default() {
        let address = Ipv4Addr::new(192, 168, 1, 10);
        let records = stream(vec![record("shelly1-ABCDEF.local.", address)]);

        let mut out = Vec::new();
        let summary = run_cycle(
            &DiscoveryConfig::default(),
            records,
            far_deadline(),
            &CannedDevices::default(),
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.emitted, 1);
        assert_eq!(
            lines(&out)[1],
            "\"shelly1-ABCDEF\";\"http://192.168.1.10\";\"0\";\"\";\"\";\"\t192.168.1.10\";\"\";\"\""
        );
    }

    #[tokio::test]
    async fn test_skip_policy_suppresses_failed_device() {
        let config = DiscoveryConfig {
            on_error: RowPolicy::Skip,
            ..Default::default()
        };
        let records = stream(vec![record("shelly1-ABCDEF.local.", Ipv4Addr::new(192, 168, 1, 10))]);

        let mut out = Vec::new();
        let summary = run_cycle(&config, records, far_deadline(), &CannedDevices::default(), &mut out)
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.emitted, 0);
        assert_eq!(lines(&out), vec![header_line(), String::new(), String::new()]);
    }

    #[tokio::test]
    async fn test_open_stream_ends_at_deadline() {
        let (_tx, rx) = mpsc::channel::<ServiceRecord>(1);
        let deadline = Instant::now() + Duration::from_millis(50);

        let mut out = Vec::new();
        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            run_cycle(&DiscoveryConfig::default(), rx, deadline, &CannedDevices::default(), &mut out),
        )
        .await
        .expect("cycle should end at the deadline")
        .unwrap();

        assert_eq!(summary, CycleSummary::default());
        assert_eq!(lines(&out), vec![header_line(), String::new(), String::new()]);
    }

    #[tokio::test]
    async fn test_records_after_deadline_are_not_processed() {
        let devices = CannedDevices::default();
        let records = stream(vec![
            record("shelly1-AAAAAA.local.", Ipv4Addr::new(10, 0, 0, 1)),
            record("shelly1-BBBBBB.local.", Ipv4Addr::new(10, 0, 0, 2)),
        ]);

        let mut out = Vec::new();
        let summary = run_cycle(&DiscoveryConfig::default(), records, Instant::now(), &devices, &mut out)
            .await
            .unwrap();

        assert!(devices.queried().is_empty());
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.emitted, 0);
    }

    #[tokio::test]
    async fn test_http_device_end_to_end() {
        let addr = spawn_device(MockDevice::default()).await;
        let client = DeviceClient::new(&DeviceConfig {
            port: addr.port(),
            ..Default::default()
        })
        .unwrap();
        let records = stream(vec![
            record("shelly1-ABCDEF.local.", Ipv4Addr::LOCALHOST),
            record("workstation.local.", Ipv4Addr::LOCALHOST),
        ]);

        let mut out = Vec::new();
        let summary = run_cycle(&DiscoveryConfig::default(), records, far_deadline(), &client, &mut out)
            .await
            .unwrap();

        assert_eq!(summary.emitted, 1);
        assert_eq!(
            lines(&out)[1],
            "\"shelly1-ABCDEF\";\"http://127.0.0.1\";\"-50\";\"22.30\";\"dhcp\";\"\t127.0.0.1\";\"255.255.255.0\";\"192.168.1.1\""
        );
    }

    #[tokio::test]
    async fn test_unreachable_http_device_still_reported() {
        let client = DeviceClient::new(&DeviceConfig {
            port: closed_port().await,
            ..Default::default()
        })
        .unwrap();
        let records = stream(vec![record("shelly1-ABCDEF.local.", Ipv4Addr::LOCALHOST)]);

        let mut out = Vec::new();
        let summary = run_cycle(&DiscoveryConfig::default(), records, far_deadline(), &client, &mut out)
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        let output = lines(&out);
        assert_eq!(output.len(), 4);
        assert!(output[1].starts_with("\"shelly1-ABCDEF\";\"http://127.0.0.1\";\"0\";\"\";"));
    }

    #[tokio::test]
    async fn test_header_written_when_browse_fails_to_start() {
        let (tx, rx) = mpsc::channel::<ServiceRecord>(1);
        let browser = tokio::spawn(async move {
            drop(tx);
            Err::<usize, _>(anyhow::anyhow!("Failed to browse _http._tcp.local."))
        });

        let mut out = Vec::new();
        let result = report_browse(
            &DiscoveryConfig::default(),
            browser,
            rx,
            far_deadline(),
            &CannedDevices::default(),
            &mut out,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(lines(&out), vec![header_line(), String::new(), String::new()]);
    }

    #[tokio::test]
    async fn test_rows_follow_spawned_browser_records() {
        let shelly = Ipv4Addr::new(192, 168, 1, 10);
        let devices = CannedDevices::default().with(shelly, STATUS_JSON, SETTINGS_JSON);
        let (tx, rx) = mpsc::channel(1);
        let browser = tokio::spawn(async move {
            tx.send(record("shelly1-ABCDEF.local.", shelly)).await?;
            Ok::<_, anyhow::Error>(1)
        });

        let mut out = Vec::new();
        let summary = report_browse(&DiscoveryConfig::default(), browser, rx, far_deadline(), &devices, &mut out)
            .await
            .unwrap();

        assert_eq!(summary.emitted, 1);
        assert_eq!(lines(&out)[0], header_line());
        assert_eq!(lines(&out)[1], SHELLY_ROW);
    }
}
