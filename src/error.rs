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

//! Error taxonomy shared by the transport, location and bridge modules.

use thiserror::Error;

/// Failures surfaced by the bridge workflow.
///
/// None of these are fatal to the process. Each one is logged and leaves
/// the workflow idle until the next trigger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// A required grant is missing or BlueZ refused access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No paired device carries the requested name.
    #[error("no paired device named '{0}'")]
    DeviceNotFound(String),

    /// Opening or connecting the socket failed.
    #[error("failed to connect to '{device}': {reason}")]
    ConnectFailure { device: String, reason: String },

    /// Writing to the socket failed, or the connection is closed.
    #[error("write failed: {0}")]
    WriteFailure(String),

    /// The location service has no position to report.
    #[error("location unavailable: {0}")]
    LocationUnavailable(String),
}

impl BridgeError {
    pub(crate) fn connect_failure(device: &str, reason: impl ToString) -> Self {
        Self::ConnectFailure {
            device: device.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Attribute a connect failure to `device`.
    pub(crate) fn for_device(self, device: &str) -> Self {
        match self {
            Self::ConnectFailure { reason, .. } => Self::connect_failure(device, reason),
            other => other,
        }
    }

    /// Short tag used in status lines and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "PermissionDenied",
            Self::DeviceNotFound(_) => "DeviceNotFound",
            Self::ConnectFailure { .. } => "ConnectFailure",
            Self::WriteFailure(_) => "WriteFailure",
            Self::LocationUnavailable(_) => "LocationUnavailable",
        }
    }
}

impl From<bluer::Error> for BridgeError {
    fn from(e: bluer::Error) -> Self {
        match e.kind {
            bluer::ErrorKind::NotAuthorized | bluer::ErrorKind::NotPermitted => {
                Self::PermissionDenied(e.message)
            }
            _ => Self::ConnectFailure {
                device: "BlueZ".to_string(),
                reason: e.to_string(),
            },
        }
    }
}
