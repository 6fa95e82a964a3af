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

//! Location source abstraction and cancellable subscriptions.

use async_trait::async_trait;
use futures::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::Coordinate;
use crate::error::BridgeError;

/// Result of a single location query.
pub type LocationResult = Result<Coordinate, BridgeError>;

/// Producer side of a [`Subscription`]. Each send replaces the previous
/// undelivered result.
pub type LocationPublisher = watch::Sender<Option<LocationResult>>;

/// Trait for position providers.
#[async_trait]
pub trait LocationSource: Send + Sync + 'static {
    /// Backend name for logs (e.g., "gpsd", "fixed").
    fn name(&self) -> &'static str;

    /// Request the current position once.
    async fn get_once(&self) -> LocationResult;

    /// Emit a position roughly every `interval` until cancelled.
    ///
    /// The default polls [`LocationSource::get_once`] on a ticker.
    fn subscribe(self: Arc<Self>, interval: Duration) -> Subscription {
        Subscription::polling(self, interval)
    }
}

/// A cancellable, infinite sequence of location results.
///
/// Only the newest result is kept. A consumer that falls behind gets the
/// latest fix on its next call; older ones are overwritten, never queued.
/// The producer never waits on the consumer.
pub struct Subscription {
    rx: watch::Receiver<Option<LocationResult>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wrap a producer task publishing into `rx`.
    pub fn new(rx: watch::Receiver<Option<LocationResult>>, task: JoinHandle<()>) -> Self {
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Latest-value slot for a producer task.
    pub fn channel() -> (LocationPublisher, watch::Receiver<Option<LocationResult>>) {
        watch::channel(None)
    }

    /// Poll `source.get_once()` every `interval`.
    pub fn polling<S>(source: Arc<S>, interval: Duration) -> Self
    where
        S: LocationSource + ?Sized,
    {
        let (tx, rx) = Self::channel();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let result = source.get_once().await;
                if tx.send(Some(result)).is_err() {
                    debug!("Subscription receiver dropped, stopping {} poller", source.name());
                    break;
                }
            }
        });
        Self::new(rx, task)
    }

    /// Wait for the next unseen result. Returns `None` once cancelled or
    /// once the producer has stopped and its last result was delivered.
    pub async fn next(&mut self) -> Option<LocationResult> {
        if self.task.is_none() {
            return None;
        }
        loop {
            self.rx.changed().await.ok()?;
            if let Some(result) = self.rx.borrow_and_update().clone() {
                return Some(result);
            }
        }
    }

    /// Stop the producer. Safe to call more than once.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_none()
    }

    /// Consume the subscription as a `futures::Stream`.
    pub fn into_stream(self) -> impl Stream<Item = LocationResult> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            let item = sub.next().await?;
            Some((item, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
