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

//! Configuration module.
//!
//! Handles loading and saving application settings.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::bluetooth::SPP_UUID;
use crate::location::DEFAULT_GPSD_PORT;

const APP_DIR: &str = "gps-spp-bridge";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bluetooth settings.
    pub bluetooth: BluetoothConfig,

    /// Location settings.
    pub location: LocationConfig,

    /// Output formatting.
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Name of the paired device to connect to.
    pub device_name: String,

    /// Service UUID of the remote RFCOMM service.
    pub service_uuid: Uuid,

    /// Adapter to use (e.g. "hci0"). Default adapter when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,

    /// Fixed RFCOMM channel. When unset the channel is resolved from
    /// `service_uuid` by BlueZ.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            device_name: "HC-05".to_string(),
            service_uuid: SPP_UUID,
            adapter: None,
            channel: None,
        }
    }
}

/// Where positions come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationBackend {
    Gpsd,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Location backend: "gpsd" or "fixed".
    pub backend: LocationBackend,

    /// Poll interval in milliseconds.
    pub interval_ms: u64,

    /// Consent to read the host position.
    pub allow: bool,

    pub gpsd_host: String,
    pub gpsd_port: u16,

    /// How long a single query waits for a fix.
    pub fix_timeout_ms: u64,

    pub fixed_latitude: f64,
    pub fixed_longitude: f64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            backend: LocationBackend::Gpsd,
            interval_ms: 5000,
            allow: true,
            gpsd_host: "127.0.0.1".to_string(),
            gpsd_port: DEFAULT_GPSD_PORT,
            fix_timeout_ms: 10_000,
            fixed_latitude: 0.0,
            fixed_longitude: 0.0,
        }
    }
}

impl LocationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Appended to every line written to the device (e.g. "\r\n").
    pub line_ending: String,
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Load configuration from the default file or create it.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from `path`, writing defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            let config = Self::default();
            config.save_to(path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.bluetooth.device_name.trim().is_empty() {
            bail!("bluetooth.device_name must not be empty");
        }
        if matches!(self.bluetooth.channel, Some(c) if !(1..=30).contains(&c)) {
            bail!("bluetooth.channel must be between 1 and 30");
        }
        if self.location.interval_ms == 0 {
            bail!("location.interval_ms must be greater than zero");
        }
        Ok(())
    }
}
