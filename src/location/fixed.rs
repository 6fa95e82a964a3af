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

//! Location source that always reports a configured position.

use async_trait::async_trait;

use super::{Coordinate, LocationResult, LocationSource};
use crate::error::BridgeError;

/// Reports the same coordinate on every query.
///
/// Useful for stationary installs and for bench-testing a serial module
/// without a GPS receiver attached.
#[derive(Debug, Clone)]
pub struct FixedSource {
    coordinate: Coordinate,
}

impl FixedSource {
    pub fn new(coordinate: Coordinate) -> Self {
        Self { coordinate }
    }
}

#[async_trait]
impl LocationSource for FixedSource {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn get_once(&self) -> LocationResult {
        if !self.coordinate.is_valid() {
            return Err(BridgeError::LocationUnavailable(format!(
                "configured position out of range: {}",
                self.coordinate
            )));
        }
        Ok(self.coordinate)
    }
}
