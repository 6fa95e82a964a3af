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

//! Permission gate.
//!
//! The bridge asks for every grant it needs up front. Each result is
//! logged; a missing grant surfaces as a distinct error, never a crash.

use async_trait::async_trait;
use bluer::Session;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, error};

use crate::bluetooth::open_adapter;
use crate::error::BridgeError;

/// Grants the workflow depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    FineLocation,
    BluetoothConnect,
    BluetoothScan,
}

impl Permission {
    /// Everything the bridge asks for at startup.
    pub const ALL: [Permission; 3] = [
        Permission::FineLocation,
        Permission::BluetoothConnect,
        Permission::BluetoothScan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::FineLocation => "fine location",
            Permission::BluetoothConnect => "Bluetooth connect",
            Permission::BluetoothScan => "Bluetooth scan",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of granted permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grants(BTreeSet<Permission>);

impl Grants {
    pub fn all() -> Self {
        Permission::ALL.into_iter().collect()
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, permission: Permission) {
        self.0.insert(permission);
    }

    pub fn is_granted(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    /// `Ok` when `permission` is granted, `PermissionDenied` otherwise.
    pub fn require(&self, permission: Permission) -> Result<(), BridgeError> {
        if self.is_granted(permission) {
            Ok(())
        } else {
            Err(BridgeError::PermissionDenied(format!(
                "{} permission not granted",
                permission
            )))
        }
    }

    /// Log one line per requested permission.
    pub fn log(&self, requested: &[Permission]) {
        for permission in requested {
            if self.is_granted(*permission) {
                debug!("{} permission granted", permission);
            } else {
                error!("{} permission denied", permission);
            }
        }
    }
}

impl FromIterator<Permission> for Grants {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Trait for permission providers.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Request `permissions` and return what was granted.
    async fn request(&self, permissions: &[Permission]) -> Grants;
}

/// Permission gate for a Linux host.
///
/// Bluetooth grants hold when BlueZ lets us open the adapter (powering
/// it on if needed). Location is governed by the `location.allow` setting.
pub struct SystemPermissions {
    location_allowed: bool,
    adapter_name: Option<String>,
}

impl SystemPermissions {
    pub fn new(location_allowed: bool, adapter_name: Option<String>) -> Self {
        Self {
            location_allowed,
            adapter_name,
        }
    }

    async fn bluetooth_available(&self) -> bool {
        let session = match Session::new().await {
            Ok(session) => session,
            Err(e) => {
                error!("Cannot open BlueZ session: {}", e);
                return false;
            }
        };
        match open_adapter(&session, self.adapter_name.as_deref()).await {
            Ok(_) => true,
            Err(BridgeError::PermissionDenied(e)) => {
                error!("Bluetooth access refused: {}", e);
                false
            }
            Err(e) => {
                error!("Device does not support Bluetooth: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl PermissionGate for SystemPermissions {
    async fn request(&self, permissions: &[Permission]) -> Grants {
        let wants_bluetooth = permissions
            .iter()
            .any(|p| matches!(p, Permission::BluetoothConnect | Permission::BluetoothScan));
        let bluetooth = wants_bluetooth && self.bluetooth_available().await;

        let grants: Grants = permissions
            .iter()
            .copied()
            .filter(|p| match p {
                Permission::FineLocation => self.location_allowed,
                Permission::BluetoothConnect | Permission::BluetoothScan => bluetooth,
            })
            .collect();

        grants.log(permissions);
        grants
    }
}

/// Gate that answers from a fixed set.
#[derive(Debug, Clone)]
pub struct StaticPermissions(Grants);

impl StaticPermissions {
    pub fn new(grants: Grants) -> Self {
        Self(grants)
    }

    pub fn granting_all() -> Self {
        Self(Grants::all())
    }
}

#[async_trait]
impl PermissionGate for StaticPermissions {
    async fn request(&self, permissions: &[Permission]) -> Grants {
        let grants: Grants = permissions
            .iter()
            .copied()
            .filter(|p| self.0.is_granted(*p))
            .collect();
        grants.log(permissions);
        grants
    }
}
