//! Integration tests for the location-to-serial workflow.

use async_trait::async_trait;
use bluer::Address;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncWrite;
use uuid::Uuid;

use gps_spp_bridge::bluetooth::{find_paired, Connection, PairedDevice, Transport, SPP_UUID};
use gps_spp_bridge::location::{FixedSource, LocationResult, LocationSource, Subscription};
use gps_spp_bridge::permissions::{Grants, Permission, StaticPermissions};
use gps_spp_bridge::state::{AppState, ConnectionStatus};
use gps_spp_bridge::{Bridge, BridgeError, BridgeSettings, Coordinate};

/// Everything written to the fake device, one entry per write.
#[derive(Clone, Default)]
struct Wire {
    writes: Arc<Mutex<Vec<String>>>,
    broken: Arc<AtomicBool>,
}

impl Wire {
    fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    fn count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

struct WireWriter(Wire);

impl AsyncWrite for WireWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        if self.0.broken.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "link lost")));
        }
        self.0
            .writes
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(buf).into_owned());
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

struct MockTransport {
    paired: Vec<PairedDevice>,
    wire: Wire,
}

impl MockTransport {
    fn with_device(name: &str, wire: Wire) -> Self {
        Self {
            paired: vec![PairedDevice {
                address: Address::new([0x98, 0xD3, 0x31, 0x00, 0x00, 0x01]),
                name: name.to_string(),
            }],
            wire,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn paired_devices(&self) -> Result<Vec<PairedDevice>, BridgeError> {
        Ok(self.paired.clone())
    }

    async fn connect(&self, device_name: &str, service_id: Uuid) -> Result<Connection, BridgeError> {
        let device = find_paired(&self.paired, device_name)
            .ok_or_else(|| BridgeError::DeviceNotFound(device_name.to_string()))?;
        Ok(Connection::from_writer(
            device.name.clone(),
            service_id,
            WireWriter(self.wire.clone()),
        ))
    }
}

/// Transport on a host without a Bluetooth adapter. Counts every call.
#[derive(Default)]
struct NoAdapterTransport {
    calls: AtomicUsize,
}

#[async_trait]
impl Transport for NoAdapterTransport {
    fn name(&self) -> &'static str {
        "no-adapter"
    }

    async fn paired_devices(&self) -> Result<Vec<PairedDevice>, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(BridgeError::ConnectFailure {
            device: "BlueZ".to_string(),
            reason: "No default adapter available".to_string(),
        })
    }

    async fn connect(&self, device_name: &str, _service_id: Uuid) -> Result<Connection, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(BridgeError::ConnectFailure {
            device: device_name.to_string(),
            reason: "No default adapter available".to_string(),
        })
    }
}

/// Emits exactly `ticks` fixes, one per interval, then ends.
struct CountedSource {
    coordinate: Coordinate,
    ticks: usize,
}

#[async_trait]
impl LocationSource for CountedSource {
    fn name(&self) -> &'static str {
        "counted"
    }

    async fn get_once(&self) -> LocationResult {
        Ok(self.coordinate)
    }

    fn subscribe(self: Arc<Self>, interval: Duration) -> Subscription {
        let (tx, rx) = Subscription::channel();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            for _ in 0..self.ticks {
                ticker.tick().await;
                if tx.send(Some(Ok(self.coordinate))).is_err() {
                    return;
                }
            }
        });
        Subscription::new(rx, task)
    }
}

fn settings(device_name: &str, interval: Duration) -> BridgeSettings {
    BridgeSettings {
        device_name: device_name.to_string(),
        service_id: SPP_UUID,
        poll_interval: interval,
        line_ending: String::new(),
    }
}

fn bridge(
    transport: MockTransport,
    location: Arc<dyn LocationSource>,
    grants: Grants,
    settings: BridgeSettings,
) -> Bridge {
    Bridge::new(
        Arc::new(transport),
        location,
        Arc::new(StaticPermissions::new(grants)),
        settings,
        AppState::new(),
    )
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn is_formatted(line: &str) -> bool {
    let Some(rest) = line.strip_prefix("Latitude: ") else {
        return false;
    };
    let Some((lat, lon)) = rest.split_once(", Longitude: ") else {
        return false;
    };
    lat.parse::<f64>().is_ok() && lon.parse::<f64>().is_ok()
}

#[tokio::test]
async fn test_unknown_device_not_found() {
    let transport = MockTransport::with_device("HC-05", Wire::default());
    for name in ["HC-06", "hc-05", "", "HC-05 "] {
        let result = transport.connect(name, SPP_UUID).await;
        assert!(matches!(result, Err(BridgeError::DeviceNotFound(_))));
    }
}

#[tokio::test]
async fn test_bridge_idle_when_device_missing() {
    let wire = Wire::default();
    let bridge = bridge(
        MockTransport::with_device("HC-05", wire.clone()),
        Arc::new(FixedSource::new(Coordinate::new(37.0, -122.0))),
        Grants::all(),
        settings("GPS-LINK", Duration::from_millis(10)),
    );

    let handle = bridge.start().await.unwrap();
    wait_until(|| handle.is_finished()).await;

    assert_eq!(bridge.state().get_status(), ConnectionStatus::Error);
    assert!(!bridge.is_connected().await);
    assert_eq!(wire.count(), 0);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_missing_grants_deny_start() {
    let wire = Wire::default();
    let bridge = bridge(
        MockTransport::with_device("HC-05", wire.clone()),
        Arc::new(FixedSource::new(Coordinate::new(37.0, -122.0))),
        [Permission::FineLocation].into_iter().collect(),
        settings("HC-05", Duration::from_millis(10)),
    );

    let result = bridge.start().await;
    assert!(matches!(result, Err(BridgeError::PermissionDenied(_))));
    assert_eq!(bridge.state().device_status(), "Bluetooth Permission Not Granted");
    assert_eq!(wire.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_n_ticks_give_n_sends() {
    let wire = Wire::default();
    let source = Arc::new(CountedSource {
        coordinate: Coordinate::new(51.5, -0.125),
        ticks: 7,
    });
    let bridge = bridge(
        MockTransport::with_device("HC-05", wire.clone()),
        source,
        Grants::all(),
        settings("HC-05", Duration::from_millis(10)),
    );

    let handle = bridge.start().await.unwrap();
    wait_until(|| handle.is_finished()).await;

    let writes = wire.writes();
    assert_eq!(writes.len(), 7);
    assert!(writes.iter().all(|w| is_formatted(w)));
    assert!(writes.iter().all(|w| w == "Latitude: 51.5, Longitude: -0.125"));
    assert!(!bridge.is_connected().await);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_connect_and_send_example() {
    let wire = Wire::default();
    let bridge = bridge(
        MockTransport::with_device("HC-05", wire.clone()),
        Arc::new(FixedSource::new(Coordinate::new(37.0, -122.0))),
        Grants::all(),
        settings("HC-05", Duration::from_millis(20)),
    );

    let handle = bridge.start().await.unwrap();
    wait_until(|| wire.count() >= 1).await;

    assert_eq!(wire.writes()[0], "Latitude: 37.0, Longitude: -122.0");
    assert_eq!(bridge.state().get_status(), ConnectionStatus::Connected);
    assert_eq!(bridge.state().device_status(), "HC-05");
    assert!(bridge.state().is_polling());
    handle.shutdown().await;
}

#[tokio::test]
async fn test_no_sends_after_shutdown() {
    let wire = Wire::default();
    let bridge = bridge(
        MockTransport::with_device("HC-05", wire.clone()),
        Arc::new(FixedSource::new(Coordinate::new(10.0, 20.0))),
        Grants::all(),
        settings("HC-05", Duration::from_millis(5)),
    );

    let handle = bridge.start().await.unwrap();
    wait_until(|| wire.count() >= 3).await;
    handle.shutdown().await;

    let sent = wire.count();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(wire.count(), sent);
    assert!(!bridge.state().is_polling());
    assert!(!bridge.is_connected().await);
    assert_eq!(bridge.state().get_status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_write_failure_stops_forwarding() {
    let wire = Wire::default();
    let bridge = bridge(
        MockTransport::with_device("HC-05", wire.clone()),
        Arc::new(FixedSource::new(Coordinate::new(1.0, 2.0))),
        Grants::all(),
        settings("HC-05", Duration::from_millis(5)),
    );

    let handle = bridge.start().await.unwrap();
    wait_until(|| wire.count() >= 1).await;
    wire.broken.store(true, Ordering::SeqCst);
    wait_until(|| handle.is_finished()).await;

    assert_eq!(bridge.state().get_status(), ConnectionStatus::Error);
    assert!(!bridge.is_connected().await);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_line_ending_appended() {
    let wire = Wire::default();
    let mut settings = settings("HC-05", Duration::from_millis(10));
    settings.line_ending = "\r\n".to_string();
    let bridge = bridge(
        MockTransport::with_device("HC-05", wire.clone()),
        Arc::new(CountedSource {
            coordinate: Coordinate::new(37.0, -122.0),
            ticks: 1,
        }),
        Grants::all(),
        settings,
    );

    let handle = bridge.start().await.unwrap();
    wait_until(|| handle.is_finished()).await;
    assert_eq!(wire.writes(), vec!["Latitude: 37.0, Longitude: -122.0\r\n"]);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_grants_and_location_come_before_transport() {
    let transport = Arc::new(NoAdapterTransport::default());
    let bridge = Bridge::new(
        transport.clone(),
        Arc::new(FixedSource::new(Coordinate::new(37.0, -122.0))),
        Arc::new(StaticPermissions::new(
            [Permission::FineLocation].into_iter().collect(),
        )),
        settings("HC-05", Duration::from_millis(10)),
        AppState::new(),
    );

    // Bluetooth denied because no adapter: the location is still read.
    let result = bridge.start().await;
    assert!(matches!(result, Err(BridgeError::PermissionDenied(_))));
    assert_eq!(bridge.state().location_status(), "Latitude: 37.0, Longitude: -122.0");
    assert_eq!(bridge.state().device_status(), "Bluetooth Permission Not Granted");
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_adapter_leaves_bridge_idle() {
    let transport = Arc::new(NoAdapterTransport::default());
    let bridge = Bridge::new(
        transport.clone(),
        Arc::new(FixedSource::new(Coordinate::new(37.0, -122.0))),
        Arc::new(StaticPermissions::granting_all()),
        settings("HC-05", Duration::from_millis(10)),
        AppState::new(),
    );

    let handle = bridge.start().await.unwrap();
    assert_eq!(bridge.state().location_status(), "Latitude: 37.0, Longitude: -122.0");
    wait_until(|| handle.is_finished()).await;

    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    assert_eq!(bridge.state().get_status(), ConnectionStatus::Error);
    assert!(!bridge.is_connected().await);
    handle.shutdown().await;
}
