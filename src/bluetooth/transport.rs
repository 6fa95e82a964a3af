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

//! Transport channel: connection lifecycle over a serial byte stream.

use async_trait::async_trait;
use bluer::Address;
use std::fmt;
use std::pin::Pin;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::BridgeError;

/// Standard SPP UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Writable half of an open socket.
pub type SocketHandle = Pin<Box<dyn AsyncWrite + Send>>;

/// A paired Bluetooth device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedDevice {
    pub address: Address,
    pub name: String,
}

/// Find the paired device whose name equals `name` exactly.
pub fn find_paired<'a>(devices: &'a [PairedDevice], name: &str) -> Option<&'a PairedDevice> {
    devices.iter().find(|d| d.name == name)
}

/// Trait for transports that can open a serial connection to a paired device.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Backend name (e.g., "RFCOMM").
    fn name(&self) -> &'static str;

    /// List devices already paired with this host.
    async fn paired_devices(&self) -> Result<Vec<PairedDevice>, BridgeError>;

    /// Open a connection to the paired device named `device_name`.
    async fn connect(&self, device_name: &str, service_id: Uuid)
        -> Result<Connection, BridgeError>;
}

/// An open (or closed) serial connection to one device.
///
/// `send` on a closed connection fails with [`BridgeError::WriteFailure`];
/// an I/O fault during `send` closes the connection.
pub struct Connection {
    target_device_name: String,
    service_id: Uuid,
    socket: Option<SocketHandle>,
}

impl Connection {
    pub fn new(target_device_name: impl Into<String>, service_id: Uuid, socket: SocketHandle) -> Self {
        Self {
            target_device_name: target_device_name.into(),
            service_id,
            socket: Some(socket),
        }
    }

    /// Wrap any async writer as a connection socket.
    pub fn from_writer<W>(target_device_name: impl Into<String>, service_id: Uuid, writer: W) -> Self
    where
        W: AsyncWrite + Send + 'static,
    {
        Self::new(target_device_name, service_id, Box::pin(writer))
    }

    pub fn device_name(&self) -> &str {
        &self.target_device_name
    }

    pub fn service_id(&self) -> Uuid {
        self.service_id
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Write `bytes` and flush. Not retried.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(BridgeError::WriteFailure(format!(
                "connection to '{}' is closed",
                self.target_device_name
            )));
        };

        let result = async {
            socket.write_all(bytes).await?;
            socket.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                debug!("Sent {} bytes to {}", bytes.len(), self.target_device_name);
                Ok(())
            }
            Err(e) => {
                warn!("Write to {} failed, closing connection", self.target_device_name);
                self.socket = None;
                Err(BridgeError::WriteFailure(e.to_string()))
            }
        }
    }

    /// Shut the socket down. Safe to call when already closed.
    pub async fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.shutdown().await {
                debug!("Socket shutdown error ignored: {}", e);
            }
            info!("Connection to {} closed", self.target_device_name);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("target_device_name", &self.target_device_name)
            .field("service_id", &self.service_id)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_spp_uuid_format() {
        assert_eq!(
            SPP_UUID.to_string().to_lowercase(),
            "00001101-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_find_paired_exact_match() {
        let devices = vec![
            PairedDevice {
                address: Address::new([0, 1, 2, 3, 4, 5]),
                name: "HC-05".to_string(),
            },
            PairedDevice {
                address: Address::new([0, 1, 2, 3, 4, 6]),
                name: "HC-06".to_string(),
            },
        ];
        assert_eq!(
            find_paired(&devices, "HC-06").map(|d| d.address),
            Some(Address::new([0, 1, 2, 3, 4, 6]))
        );
        assert!(find_paired(&devices, "hc-05").is_none());
        assert!(find_paired(&devices, "HC-0").is_none());
    }

    #[tokio::test]
    async fn test_send_writes_bytes() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut conn = Connection::from_writer("HC-05", SPP_UUID, client);
        assert_eq!(conn.service_id(), SPP_UUID);

        conn.send(b"Latitude: 37.0, Longitude: -122.0").await.unwrap();
        conn.close().await;

        let mut received = String::new();
        server.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "Latitude: 37.0, Longitude: -122.0");
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (client, _server) = tokio::io::duplex(64);
        let mut conn = Connection::from_writer("HC-05", SPP_UUID, client);

        conn.close().await;
        conn.close().await;
        assert!(!conn.is_open());
        assert!(matches!(
            conn.send(b"x").await,
            Err(BridgeError::WriteFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_io_error_closes_connection() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let mut conn = Connection::from_writer("HC-05", SPP_UUID, client);

        assert!(matches!(
            conn.send(b"x").await,
            Err(BridgeError::WriteFailure(_))
        ));
        assert!(!conn.is_open());
    }
}
