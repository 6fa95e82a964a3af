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

//! Bluetooth RFCOMM client implementation.

use async_trait::async_trait;
use bluer::rfcomm::{Profile, ProfileHandle, Role, SocketAddr, Stream};
use bluer::{Adapter, Device, Session};
use futures::StreamExt;
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::transport::{find_paired, Connection, PairedDevice, SocketHandle, Transport};
use crate::error::BridgeError;

/// Upper bound on a single connect attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Open the named (or default) adapter and make sure it is powered.
pub async fn open_adapter(session: &Session, name: Option<&str>) -> Result<Adapter, BridgeError> {
    let adapter = match name {
        Some(name) => session.adapter(name)?,
        None => session.default_adapter().await?,
    };
    info!("Using Bluetooth adapter: {}", adapter.name());

    // Ensure adapter is powered on
    if !adapter.is_powered().await? {
        info!("Powering on Bluetooth adapter...");
        adapter.set_powered(true).await?;
    }

    Ok(adapter)
}

fn io_error(device: &str, e: io::Error) -> BridgeError {
    match e.kind() {
        io::ErrorKind::PermissionDenied => BridgeError::PermissionDenied(e.to_string()),
        _ => BridgeError::connect_failure(device, e),
    }
}

fn bluer_error(device: &str, e: bluer::Error) -> BridgeError {
    BridgeError::from(e).for_device(device)
}

pin_project! {
    /// Socket obtained through a registered profile.
    ///
    /// The profile stays registered for as long as the socket lives.
    struct ProfileStream {
        #[pin]
        stream: Stream,
        _profile: Pin<Box<ProfileHandle>>,
    }
}

impl AsyncWrite for ProfileStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.project().stream.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().stream.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().stream.poll_shutdown(cx)
    }
}

/// Open BlueZ session and adapter.
struct BlueZ {
    session: Session,
    adapter: Adapter,
}

/// RFCOMM client transport over BlueZ.
///
/// BlueZ is only contacted on the first `paired_devices` or `connect`
/// call, so building the transport never touches the adapter.
pub struct RfcommTransport {
    adapter_name: Option<String>,
    channel: Option<u8>,
    bluez: OnceCell<BlueZ>,
}

impl RfcommTransport {
    /// Create a new RFCOMM transport.
    ///
    /// With `channel` set, sockets connect straight to that RFCOMM
    /// channel. Otherwise the channel is resolved from the service UUID.
    pub fn new(adapter_name: Option<String>, channel: Option<u8>) -> Self {
        Self {
            adapter_name,
            channel,
            bluez: OnceCell::new(),
        }
    }

    /// Whether the BlueZ session has been opened.
    pub fn is_initialized(&self) -> bool {
        self.bluez.initialized()
    }

    async fn bluez(&self) -> Result<&BlueZ, BridgeError> {
        self.bluez
            .get_or_try_init(|| async {
                info!("Initializing RFCOMM transport...");

                // Create BlueZ session
                let session = Session::new().await?;
                info!("BlueZ session created");

                let adapter = open_adapter(&session, self.adapter_name.as_deref()).await?;
                Ok::<_, BridgeError>(BlueZ { session, adapter })
            })
            .await
    }

    /// Name used for matching: remote name, or the alias when unknown.
    async fn device_name(device: &Device) -> bluer::Result<String> {
        match device.name().await? {
            Some(name) => Ok(name),
            None => device.alias().await,
        }
    }

    async fn connect_channel(&self, device: &PairedDevice, channel: u8) -> Result<SocketHandle, BridgeError> {
        debug!("Connecting to {} on RFCOMM channel {}", device.address, channel);
        let stream = Stream::connect(SocketAddr::new(device.address, channel))
            .await
            .map_err(|e| io_error(&device.name, e))?;
        Ok(Box::pin(stream))
    }

    async fn connect_profile(&self, device: &PairedDevice, service_id: Uuid) -> Result<SocketHandle, BridgeError> {
        debug!("Connecting to {} via service {}", device.address, service_id);

        let profile = Profile {
            uuid: service_id,
            role: Some(Role::Client),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        let bluez = self.bluez().await?;
        let mut handle = Box::pin(
            bluez
                .session
                .register_profile(profile)
                .await
                .map_err(|e| bluer_error(&device.name, e))?,
        );

        let remote = bluez
            .adapter
            .device(device.address)
            .map_err(|e| bluer_error(&device.name, e))?;
        let connect = remote.connect_profile(&service_id);
        tokio::pin!(connect);

        // BlueZ hands us the socket through the profile while the connect
        // call is still pending.
        let request = tokio::select! {
            result = &mut connect => {
                result.map_err(|e| bluer_error(&device.name, e))?;
                handle.next().await
            }
            request = handle.next() => request,
        };

        let request = request.ok_or_else(|| {
            BridgeError::connect_failure(&device.name, "profile closed before connecting")
        })?;
        let stream = request.accept().map_err(|e| bluer_error(&device.name, e))?;

        Ok(Box::pin(ProfileStream {
            stream,
            _profile: handle,
        }))
    }
}

#[async_trait]
impl Transport for RfcommTransport {
    fn name(&self) -> &'static str {
        "RFCOMM"
    }

    async fn paired_devices(&self) -> Result<Vec<PairedDevice>, BridgeError> {
        let adapter = &self.bluez().await?.adapter;
        let mut devices = Vec::new();

        for addr in adapter.device_addresses().await? {
            let device = adapter.device(addr)?;
            if device.is_paired().await? {
                let name = Self::device_name(&device)
                    .await
                    .unwrap_or_else(|_| addr.to_string());
                devices.push(PairedDevice {
                    address: addr,
                    name,
                });
            }
        }

        Ok(devices)
    }

    async fn connect(&self, device_name: &str, service_id: Uuid) -> Result<Connection, BridgeError> {
        let devices = self
            .paired_devices()
            .await
            .map_err(|e| e.for_device(device_name))?;
        let Some(device) = find_paired(&devices, device_name) else {
            warn!(
                "No paired device named '{}' (paired: {:?})",
                device_name,
                devices.iter().map(|d| d.name.as_str()).collect::<Vec<_>>()
            );
            return Err(BridgeError::DeviceNotFound(device_name.to_string()));
        };
        info!("Found paired device {} ({})", device.name, device.address);

        let open = async {
            match self.channel {
                Some(channel) => self.connect_channel(device, channel).await,
                None => self.connect_profile(device, service_id).await,
            }
        };
        let socket = tokio::time::timeout(CONNECT_TIMEOUT, open)
            .await
            .map_err(|_| BridgeError::connect_failure(device_name, "timed out"))??;

        info!("Connected to {} ({})", device.name, device.address);
        Ok(Connection::new(device_name, service_id, socket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_does_not_open_bluez() {
        let transport = RfcommTransport::new(Some("hci9".to_string()), Some(1));
        assert!(!transport.is_initialized());
        assert_eq!(transport.name(), "RFCOMM");
    }
}
