//! Waiting for restored objects to become ready
//!
//! One watch is opened per resource type and fanned out to every waiter
//! through a broadcast channel. Waiters subscribe before their object is
//! created so they can't miss its events.

use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use salvage_common::Unstructured;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::client::WatchEvent;
use crate::error::RestoreError;

/// Events buffered per waiter before it starts lagging
const WATCH_BUFFER: usize = 256;

/// A watch stream forwarded to any number of subscribers
pub struct WatchHandle {
    template: broadcast::Receiver<WatchEvent>,
    forwarder: JoinHandle<()>,
}

impl WatchHandle {
    /// Start forwarding `stream`. Must be called inside a Tokio runtime.
    pub fn spawn(mut stream: BoxStream<'static, WatchEvent>) -> Self {
        let (sender, template) = broadcast::channel(WATCH_BUFFER);
        let forwarder = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                // No subscribers yet is fine, the event is simply dropped
                let _ = sender.send(event);
            }
        });
        Self {
            template,
            forwarder,
        }
    }

    /// Receiver seeing every event forwarded from now on
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.template.resubscribe()
    }

    /// Stop forwarding. Subscribers see the channel close.
    pub fn stop(&self) {
        self.forwarder.abort();
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// Wait until an added or modified `name` satisfies `ready`, for at most
/// `timeout`. A zero timeout only sees events already buffered.
pub async fn wait_for_ready(
    mut events: broadcast::Receiver<WatchEvent>,
    name: &str,
    ready: fn(&Unstructured) -> bool,
    timeout: Duration,
) -> Result<Unstructured, RestoreError> {
    let wait = async {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(name = %name, skipped, "Watch subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(RestoreError::Client(format!(
                        "watch closed before {} became ready",
                        name
                    )))
                }
            };

            let obj = match event {
                WatchEvent::Added(obj) | WatchEvent::Modified(obj) => obj,
                WatchEvent::Deleted(_) => continue,
            };
            if obj.name() != name {
                continue;
            }
            if ready(&obj) {
                return Ok(obj);
            }
            debug!(name = %name, "Item is not ready yet");
        }
    };

    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| RestoreError::Timeout {
            seconds: timeout.as_secs(),
        })?
}
