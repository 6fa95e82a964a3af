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

//! GPS to Bluetooth serial bridge.
//!
//! Reads the host position from a location source and writes each fix as
//! `Latitude: <lat>, Longitude: <lon>` to a paired SPP device.

pub mod bluetooth;
pub mod bridge;
pub mod config;
pub mod error;
pub mod location;
pub mod permissions;
pub mod state;

pub use bridge::{format_coordinate, Bridge, BridgeHandle, BridgeSettings};
pub use error::BridgeError;
pub use location::Coordinate;
