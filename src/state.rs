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

//! Application state management.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::location::Coordinate;

/// Connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Error => "Error",
        }
    }
}

/// Last location query outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
enum LocationStatus {
    Waiting,
    Fix(Coordinate),
    Failed,
}

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    /// Current connection status.
    pub connection_status: RwLock<ConnectionStatus>,

    /// Connected device name.
    pub connected_device: RwLock<Option<String>>,

    /// Whether the poll-and-send loop is running.
    pub polling: RwLock<bool>,

    /// Whether Bluetooth access was granted.
    pub bluetooth_permitted: RwLock<bool>,

    location: RwLock<LocationStatus>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            connection_status: RwLock::new(ConnectionStatus::Disconnected),
            connected_device: RwLock::new(None),
            polling: RwLock::new(false),
            bluetooth_permitted: RwLock::new(false),
            location: RwLock::new(LocationStatus::Waiting),
        }
    }
}

impl AppState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_connecting(&self) {
        *self.connection_status.write() = ConnectionStatus::Connecting;
    }

    pub fn set_connected(&self, device_name: String) {
        *self.connection_status.write() = ConnectionStatus::Connected;
        *self.connected_device.write() = Some(device_name);
    }

    pub fn set_disconnected(&self) {
        *self.connection_status.write() = ConnectionStatus::Disconnected;
        *self.connected_device.write() = None;
    }

    pub fn set_error(&self) {
        *self.connection_status.write() = ConnectionStatus::Error;
        *self.connected_device.write() = None;
    }

    pub fn get_status(&self) -> ConnectionStatus {
        *self.connection_status.read()
    }

    pub fn get_device_name(&self) -> Option<String> {
        self.connected_device.read().clone()
    }

    pub fn set_polling(&self, polling: bool) {
        *self.polling.write() = polling;
    }

    pub fn is_polling(&self) -> bool {
        *self.polling.read()
    }

    pub fn set_bluetooth_permitted(&self, permitted: bool) {
        *self.bluetooth_permitted.write() = permitted;
    }

    pub fn set_last_coordinate(&self, coordinate: Coordinate) {
        *self.location.write() = LocationStatus::Fix(coordinate);
    }

    pub fn set_location_failed(&self) {
        *self.location.write() = LocationStatus::Failed;
    }

    pub fn get_last_coordinate(&self) -> Option<Coordinate> {
        match *self.location.read() {
            LocationStatus::Fix(c) => Some(c),
            _ => None,
        }
    }

    /// One-line location summary.
    pub fn location_status(&self) -> String {
        match *self.location.read() {
            LocationStatus::Waiting => "Waiting for location".to_string(),
            LocationStatus::Fix(c) => c.to_string(),
            LocationStatus::Failed => "Failed to get location".to_string(),
        }
    }

    /// One-line device summary.
    pub fn device_status(&self) -> String {
        if !*self.bluetooth_permitted.read() {
            return "Bluetooth Permission Not Granted".to_string();
        }
        self.get_device_name()
            .unwrap_or_else(|| "No Connected Bluetooth Device".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_status() {
        let state = AppState::new();
        assert_eq!(state.device_status(), "Bluetooth Permission Not Granted");

        state.set_bluetooth_permitted(true);
        assert_eq!(state.device_status(), "No Connected Bluetooth Device");

        state.set_connected("HC-05".to_string());
        assert_eq!(state.get_status(), ConnectionStatus::Connected);
        assert_eq!(state.get_status().as_str(), "Connected");
        assert_eq!(state.device_status(), "HC-05");

        state.set_disconnected();
        assert_eq!(state.device_status(), "No Connected Bluetooth Device");
    }

    #[test]
    fn test_location_status() {
        let state = AppState::new();
        assert_eq!(state.location_status(), "Waiting for location");

        state.set_last_coordinate(Coordinate::new(37.0, -122.0));
        assert_eq!(state.location_status(), "Latitude: 37.0, Longitude: -122.0");

        state.set_location_failed();
        assert_eq!(state.location_status(), "Failed to get location");
        assert!(state.get_last_coordinate().is_none());
    }
}
