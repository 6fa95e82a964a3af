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

//! gpsd client.
//!
//! gpsd speaks newline-delimited JSON on TCP port 2947. After a `?WATCH`
//! command it streams reports; only `TPV` reports carrying a 2D or 3D
//! fix are turned into coordinates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{Coordinate, LocationPublisher, LocationResult, LocationSource, Subscription};
use crate::error::BridgeError;

/// Default gpsd TCP port.
pub const DEFAULT_GPSD_PORT: u16 = 2947;

/// Enable JSON streaming.
const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";

/// Minimum TPV mode that carries a horizontal position (2 = 2D fix).
const MODE_2D: u8 = 2;

/// The subset of gpsd reports we care about.
#[derive(Debug, Deserialize)]
#[serde(tag = "class")]
enum Report {
    #[serde(rename = "TPV")]
    Tpv(Tpv),
    #[serde(rename = "VERSION")]
    Version { release: String },
    #[serde(other)]
    Other,
}

/// Time-position-velocity report.
#[derive(Debug, Deserialize)]
struct Tpv {
    #[serde(default)]
    mode: u8,
    lat: Option<f64>,
    lon: Option<f64>,
    time: Option<DateTime<Utc>>,
}

impl Tpv {
    fn into_coordinate(self) -> Option<Coordinate> {
        if self.mode < MODE_2D {
            return None;
        }
        let mut coordinate = Coordinate::new(self.lat?, self.lon?);
        if let Some(time) = self.time {
            coordinate = coordinate.with_time(time);
        }
        Some(coordinate)
    }
}

/// Extract a fix from one line of gpsd output.
pub fn parse_fix(line: &str) -> Option<Coordinate> {
    match serde_json::from_str::<Report>(line) {
        Ok(Report::Tpv(tpv)) => tpv.into_coordinate(),
        Ok(Report::Version { release }) => {
            info!("Connected to gpsd {}", release);
            None
        }
        Ok(Report::Other) => None,
        Err(e) => {
            debug!("Ignoring unparseable gpsd line: {}", e);
            None
        }
    }
}

type ReportLines = Lines<BufReader<TcpStream>>;

/// Location source backed by a gpsd daemon.
#[derive(Debug, Clone)]
pub struct GpsdSource {
    host: String,
    port: u16,
    fix_timeout: Duration,
}

impl GpsdSource {
    pub fn new(host: impl Into<String>, port: u16, fix_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            fix_timeout,
        }
    }

    fn unavailable(&self, reason: impl std::fmt::Display) -> BridgeError {
        BridgeError::LocationUnavailable(format!("gpsd {}:{}: {}", self.host, self.port, reason))
    }

    /// Connect and switch gpsd into JSON watch mode.
    async fn open_watch(&self) -> Result<ReportLines, BridgeError> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| self.unavailable(e))?;
        stream
            .write_all(WATCH_COMMAND)
            .await
            .map_err(|e| self.unavailable(e))?;
        debug!("gpsd watch enabled on {}:{}", self.host, self.port);
        Ok(BufReader::new(stream).lines())
    }

    async fn first_fix(&self) -> LocationResult {
        let mut lines = self.open_watch().await?;
        while let Some(line) = lines.next_line().await.map_err(|e| self.unavailable(e))? {
            if let Some(coordinate) = parse_fix(&line) {
                return Ok(coordinate);
            }
        }
        Err(self.unavailable("connection closed before a fix"))
    }

    /// Keep one watch open and publish the newest fix on every tick.
    ///
    /// Publishing never blocks, so reports keep being read while the
    /// consumer is busy.
    async fn watch_loop(&self, interval: Duration, tx: LocationPublisher) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut lines: Option<ReportLines> = None;
        let mut latest: Option<Coordinate> = None;

        loop {
            if lines.is_none() {
                ticker.tick().await;
                match self.open_watch().await {
                    Ok(opened) => lines = Some(opened),
                    Err(e) => {
                        if tx.send(Some(Err(e))).is_err() {
                            return;
                        }
                    }
                }
                continue;
            }
            let Some(reader) = lines.as_mut() else {
                continue;
            };

            let mut lost = false;
            tokio::select! {
                _ = ticker.tick() => {
                    let item = latest.ok_or_else(|| self.unavailable("no fix yet"));
                    if tx.send(Some(item)).is_err() {
                        return;
                    }
                }
                line = reader.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(coordinate) = parse_fix(&line) {
                            latest = Some(coordinate);
                        }
                    }
                    Ok(None) => {
                        warn!("gpsd closed the connection");
                        lost = true;
                    }
                    Err(e) => {
                        warn!("gpsd read error: {}", e);
                        lost = true;
                    }
                },
            }

            if lost {
                lines = None;
                latest = None;
            }
        }
    }
}

#[async_trait]
impl LocationSource for GpsdSource {
    fn name(&self) -> &'static str {
        "gpsd"
    }

    async fn get_once(&self) -> LocationResult {
        match tokio::time::timeout(self.fix_timeout, self.first_fix()).await {
            Ok(result) => result,
            Err(_) => Err(self.unavailable(format!(
                "no fix within {} ms",
                self.fix_timeout.as_millis()
            ))),
        }
    }

    fn subscribe(self: Arc<Self>, interval: Duration) -> Subscription {
        let (tx, rx) = Subscription::channel();
        let task = tokio::spawn(async move {
            self.watch_loop(interval, tx).await;
        });
        Subscription::new(rx, task)
    }
}
