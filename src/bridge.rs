// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Workflow orchestration.
//!
//! Checks grants, connects the transport, then forwards every location
//! fix to the connected device until shut down.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bluetooth::{Connection, Transport};
use crate::config::Config;
use crate::error::BridgeError;
use crate::location::{Coordinate, LocationSource};
use crate::permissions::{Permission, PermissionGate};
use crate::state::AppState;

/// Format a fix as the text written to the device.
pub fn format_coordinate(coordinate: &Coordinate) -> String {
    coordinate.to_string()
}

/// Runtime settings for the workflow.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Name of the paired device to connect to.
    pub device_name: String,
    /// Service UUID used to open the socket.
    pub service_id: Uuid,
    pub poll_interval: Duration,
    /// Appended to each formatted line.
    pub line_ending: String,
}

impl BridgeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            device_name: config.bluetooth.device_name.clone(),
            service_id: config.bluetooth.service_uuid,
            poll_interval: config.location.interval(),
            line_ending: config.output.line_ending.clone(),
        }
    }
}

/// Drives the location-to-serial workflow.
///
/// Holds at most one open [`Connection`] at a time.
#[derive(Clone)]
pub struct Bridge {
    transport: Arc<dyn Transport>,
    location: Arc<dyn LocationSource>,
    permissions: Arc<dyn PermissionGate>,
    settings: Arc<BridgeSettings>,
    state: Arc<AppState>,
    connection: Arc<Mutex<Option<Connection>>>,
}

impl Bridge {
    pub fn new(
        transport: Arc<dyn Transport>,
        location: Arc<dyn LocationSource>,
        permissions: Arc<dyn PermissionGate>,
        settings: BridgeSettings,
        state: Arc<AppState>,
    ) -> Self {
        Self {
            transport,
            location,
            permissions,
            settings: Arc::new(settings),
            state,
            connection: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Whether a connection is currently open.
    pub async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .map_or(false, Connection::is_open)
    }

    /// Check grants and spawn the workflow.
    ///
    /// Fails with `PermissionDenied` when location or Bluetooth access is
    /// missing. Connect and send failures happen later, in the spawned
    /// task, and are only logged.
    pub async fn start(&self) -> Result<BridgeHandle, BridgeError> {
        let grants = self.permissions.request(&Permission::ALL).await;
        self.state
            .set_bluetooth_permitted(grants.is_granted(Permission::BluetoothConnect));

        if grants.is_granted(Permission::FineLocation) {
            self.log_last_location().await;
        }
        grants.require(Permission::FineLocation)?;
        grants.require(Permission::BluetoothConnect)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let bridge = self.clone();
        let task = tokio::spawn(async move {
            bridge.run(shutdown_rx).await;
        });

        Ok(BridgeHandle {
            shutdown: shutdown_tx,
            task,
            state: self.state.clone(),
        })
    }

    /// One-shot position query logged at startup.
    async fn log_last_location(&self) {
        match self.location.get_once().await {
            Ok(coordinate) => {
                info!("{}", coordinate);
                self.state.set_last_coordinate(coordinate);
            }
            Err(e) => {
                error!("Failed to get location: {}", e);
                self.state.set_location_failed();
            }
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let Some(connection) = self.connect(&mut shutdown).await else {
            return;
        };
        self.install(connection).await;

        let result = self.poll_loop(&mut shutdown).await;
        self.teardown().await;
        if let Err(e) = result {
            error!("Stopped forwarding ({}): {}", e.kind(), e);
            self.state.set_error();
        }
    }

    /// Connect on a separate task so shutdown can abort it.
    async fn connect(&self, shutdown: &mut watch::Receiver<bool>) -> Option<Connection> {
        self.state.set_connecting();
        info!(
            "Connecting to '{}' over {}...",
            self.settings.device_name,
            self.transport.name()
        );

        let transport = self.transport.clone();
        let settings = self.settings.clone();
        let mut connect_task = tokio::spawn(async move {
            transport
                .connect(&settings.device_name, settings.service_id)
                .await
        });

        let joined = tokio::select! {
            joined = &mut connect_task => joined,
            _ = shutdown.changed() => {
                connect_task.abort();
                info!("Connect attempt cancelled");
                self.state.set_disconnected();
                return None;
            }
        };

        match joined {
            Ok(Ok(connection)) => Some(connection),
            Ok(Err(e)) => {
                error!("Bluetooth connection failed ({}): {}", e.kind(), e);
                self.state.set_error();
                None
            }
            Err(e) => {
                error!("Connect task failed: {}", e);
                self.state.set_error();
                None
            }
        }
    }

    /// Store `connection`, closing any previous one first.
    async fn install(&self, connection: Connection) {
        let mut slot = self.connection.lock().await;
        if let Some(mut previous) = slot.take() {
            previous.close().await;
        }
        info!(
            "Connected to {} (service {})",
            connection.device_name(),
            connection.service_id()
        );
        self.state.set_connected(connection.device_name().to_string());
        *slot = Some(connection);
    }

    async fn poll_loop(&self, shutdown: &mut watch::Receiver<bool>) -> Result<(), BridgeError> {
        let mut subscription = self.location.clone().subscribe(self.settings.poll_interval);
        self.state.set_polling(true);
        info!(
            "Forwarding {} fixes every {} ms",
            self.location.name(),
            self.settings.poll_interval.as_millis()
        );

        let result = loop {
            if *shutdown.borrow() || !self.state.is_polling() {
                break Ok(());
            }

            let item = tokio::select! {
                biased;
                _ = shutdown.changed() => break Ok(()),
                item = subscription.next() => item,
            };

            match item {
                None => {
                    warn!("Location subscription ended");
                    break Ok(());
                }
                Some(Err(e)) => {
                    warn!("Failed to get location: {}", e);
                    self.state.set_location_failed();
                }
                Some(Ok(coordinate)) => {
                    self.state.set_last_coordinate(coordinate);
                    if let Err(e) = self.send_coordinate(&coordinate).await {
                        break Err(e);
                    }
                }
            }
        };

        subscription.cancel();
        self.state.set_polling(false);
        result
    }

    async fn send_coordinate(&self, coordinate: &Coordinate) -> Result<(), BridgeError> {
        let line = format!("{}{}", format_coordinate(coordinate), self.settings.line_ending);
        let mut slot = self.connection.lock().await;
        let connection = slot
            .as_mut()
            .ok_or_else(|| BridgeError::WriteFailure("not connected".to_string()))?;
        connection.send(line.as_bytes()).await?;
        debug!("Sent: {}", line.trim_end());
        Ok(())
    }

    async fn teardown(&self) {
        if let Some(mut connection) = self.connection.lock().await.take() {
            connection.close().await;
        }
        self.state.set_disconnected();
    }
}

/// Handle to a running workflow.
pub struct BridgeHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    state: Arc<AppState>,
}

impl BridgeHandle {
    /// Whether the workflow has gone idle (failed or finished).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop polling, close the connection and wait for the workflow to exit.
    ///
    /// No send happens after this returns.
    pub async fn shutdown(self) {
        self.state.set_polling(false);
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                error!("Bridge task failed: {}", e);
            }
        }
        info!("Bridge stopped");
    }
}
