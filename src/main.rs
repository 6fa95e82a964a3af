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

//! GPS SPP Bridge daemon

use anyhow::Result;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gps_spp_bridge::bluetooth::{RfcommTransport, Transport};
use gps_spp_bridge::config::Config;
use gps_spp_bridge::location;
use gps_spp_bridge::permissions::SystemPermissions;
use gps_spp_bridge::state::AppState;
use gps_spp_bridge::{Bridge, BridgeHandle, BridgeSettings};

/// Build the bridge and start it. Failures are logged and leave it idle.
///
/// The transport opens BlueZ lazily, so grants are requested before the
/// adapter is touched.
async fn start_bridge(config: &Config, state: &Arc<AppState>) -> Option<BridgeHandle> {
    let transport: Arc<dyn Transport> = Arc::new(RfcommTransport::new(
        config.bluetooth.adapter.clone(),
        config.bluetooth.channel,
    ));

    let bridge = Bridge::new(
        transport,
        location::create_source(&config.location),
        Arc::new(SystemPermissions::new(
            config.location.allow,
            config.bluetooth.adapter.clone(),
        )),
        BridgeSettings::from_config(config),
        state.clone(),
    );

    match bridge.start().await {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("Bridge not started ({}): {}", e.kind(), e);
            None
        }
    }
}

fn log_status(state: &AppState) {
    info!(
        "{} | {} | {}",
        state.get_status().as_str(),
        state.device_status(),
        state.location_status()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gps_spp_bridge=info".parse()?),
        )
        .init();

    info!(
        "Starting GPS SPP Bridge v{}...",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration
    let config = Config::load()?;
    info!(
        "Configuration loaded (target device '{}')",
        config.bluetooth.device_name
    );

    let state = AppState::new();
    let mut handle = start_bridge(&config, &state).await;
    log_status(&state);

    // SIGUSR1 retries an idle bridge
    let mut retry = signal(SignalKind::user_defined1())?;

    loop {
        tokio::select! {
            _ = retry.recv() => {
                if handle.as_ref().is_some_and(|h| !h.is_finished()) {
                    warn!("Bridge is running, retry ignored");
                    continue;
                }
                info!("Retry requested");
                if let Some(old) = handle.take() {
                    old.shutdown().await;
                }
                handle = start_bridge(&config, &state).await;
                log_status(&state);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    if let Some(handle) = handle {
        handle.shutdown().await;
    }

    info!("GPS SPP Bridge stopped");
    Ok(())
}
