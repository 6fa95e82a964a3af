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

//! Location module.
//!
//! Provides position fixes from gpsd or from a fixed configured point.

mod coordinate;
mod fixed;
mod gpsd;
mod source;

pub use coordinate::Coordinate;
pub use fixed::FixedSource;
pub use gpsd::{parse_fix, GpsdSource, DEFAULT_GPSD_PORT};
pub use source::{LocationPublisher, LocationResult, LocationSource, Subscription};

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{LocationBackend, LocationConfig};

/// Create the location source selected in config.
pub fn create_source(config: &LocationConfig) -> Arc<dyn LocationSource> {
    match config.backend {
        LocationBackend::Gpsd => {
            info!(
                "Using gpsd location source at {}:{}",
                config.gpsd_host, config.gpsd_port
            );
            Arc::new(GpsdSource::new(
                config.gpsd_host.clone(),
                config.gpsd_port,
                Duration::from_millis(config.fix_timeout_ms),
            ))
        }
        LocationBackend::Fixed => {
            let coordinate = Coordinate::new(config.fixed_latitude, config.fixed_longitude);
            info!("Using fixed location source: {}", coordinate);
            Arc::new(FixedSource::new(coordinate))
        }
    }
}
