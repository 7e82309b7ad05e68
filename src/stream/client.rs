//! Live stream client
//!
//! `Stopped -> Connecting -> Streaming -> Stopped`. A transport close or
//! error drops the client back to `Stopped` and publishes a lifecycle
//! notification; reconnecting is the caller's decision.

use super::bus::SubscriptionBus;
use super::jetstream::{decode_frame, SubscribeRequest};
use super::transport::{StreamConnection, StreamTransport};
use crate::config::StreamConfig;
use crate::error::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Stopped,
    Connecting,
    Streaming,
}

/// Lifecycle notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamLifecycle {
    Connected,
    Disconnected { reason: String },
    Error { message: String },
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Shared between the client and its read loop
struct Inner {
    bus: Arc<SubscriptionBus>,
    state: RwLock<StreamState>,
    lifecycle: broadcast::Sender<StreamLifecycle>,
    allowed_dids: HashSet<String>,
    /// `time_us` of the last event seen, for resuming
    cursor: AtomicI64,
}

impl Inner {
    fn set_state(&self, state: StreamState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn publish(&self, event: StreamLifecycle) {
        // No receivers is fine
        let _ = self.lifecycle.send(event);
    }

    fn handle_frame(&self, text: &str) {
        let event = match decode_frame(text) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Skipping malformed stream frame: {}", e);
                return;
            }
        };

        self.cursor.fetch_max(event.received_at_micros, Ordering::SeqCst);
        if !self.allowed_dids.is_empty() && !self.allowed_dids.contains(&event.repository_id) {
            tracing::trace!("Dropping event from {}", event.repository_id);
            return;
        }

        let delivered = self.bus.dispatch(&event);
        tracing::debug!(
            "{} {} {} delivered to {} subscribers",
            event.operation,
            event.collection,
            event.uri,
            delivered
        );
    }
}

/// Consumes one event stream and republishes it through a [`SubscriptionBus`]
pub struct StreamClient {
    transport: Arc<dyn StreamTransport>,
    request: SubscribeRequest,
    inner: Arc<Inner>,
    running: Mutex<Option<Running>>,
}

impl StreamClient {
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        bus: Arc<SubscriptionBus>,
        config: &StreamConfig,
    ) -> Self {
        let (lifecycle, _) = broadcast::channel(config.channel_capacity.max(1));
        let request = SubscribeRequest::from_config(config);
        Self {
            transport,
            inner: Arc::new(Inner {
                bus,
                state: RwLock::new(StreamState::Stopped),
                lifecycle,
                allowed_dids: request.wanted_dids.iter().cloned().collect(),
                cursor: AtomicI64::new(request.cursor.unwrap_or(0)),
            }),
            request,
            running: Mutex::new(None),
        }
    }

    pub fn state(&self) -> StreamState {
        *self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn bus(&self) -> &Arc<SubscriptionBus> {
        &self.inner.bus
    }

    /// Lifecycle notifications published from now on
    pub fn lifecycle(&self) -> broadcast::Receiver<StreamLifecycle> {
        self.inner.lifecycle.subscribe()
    }

    /// `time_us` of the newest event seen, if any
    pub fn cursor(&self) -> Option<i64> {
        match self.inner.cursor.load(Ordering::SeqCst) {
            0 => None,
            cursor => Some(cursor),
        }
    }

    /// Connect, subscribe and start dispatching.
    ///
    /// Does nothing while already connecting or streaming. A restart
    /// resumes from the newest event seen.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if self.state() != StreamState::Stopped {
            return Ok(());
        }
        if let Some(previous) = running.take() {
            // The previous read loop ended on its own
            let _ = previous.task.await;
        }

        self.inner.set_state(StreamState::Connecting);
        let mut request = self.request.clone();
        request.cursor = self.cursor().or(request.cursor);

        let connection = match self.transport.connect(&request).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::error!("Stream connection failed: {}", e);
                self.inner.set_state(StreamState::Stopped);
                self.inner.publish(StreamLifecycle::Error {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        self.inner.set_state(StreamState::Streaming);
        self.inner.publish(StreamLifecycle::Connected);
        tracing::info!(
            "Streaming {} collections for {} repositories",
            request.wanted_collections.len(),
            request.wanted_dids.len()
        );

        let cancel = CancellationToken::new();
        let task = tokio::spawn(read_loop(self.inner.clone(), connection, cancel.clone()));
        *running = Some(Running { cancel, task });
        Ok(())
    }

    /// Close the transport and wait for the read loop to finish.
    ///
    /// No event received after this returns is dispatched.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.cancel.cancel();
        if let Err(e) = running.task.await {
            tracing::error!("Stream task failed: {}", e);
        }
        self.inner.set_state(StreamState::Stopped);
    }
}

async fn read_loop(inner: Arc<Inner>, mut connection: Box<dyn StreamConnection>, cancel: CancellationToken) {
    let reason = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                if let Err(e) = connection.close().await {
                    tracing::warn!("Error closing stream: {}", e);
                }
                break "stopped".to_string();
            }

            frame = connection.next_frame() => match frame {
                Some(Ok(text)) => {
                    if cancel.is_cancelled() {
                        continue;
                    }
                    inner.handle_frame(&text);
                }
                Some(Err(e)) => {
                    tracing::error!("Stream error: {}", e);
                    inner.publish(StreamLifecycle::Error { message: e.to_string() });
                    break e.to_string();
                }
                None => break "closed by server".to_string(),
            }
        }
    };

    inner.set_state(StreamState::Stopped);
    inner.publish(StreamLifecycle::Disconnected { reason: reason.clone() });
    tracing::info!("Stream disconnected: {}", reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ChannelTransport;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn commit(did: &str, time_us: i64, shape: &str) -> String {
        serde_json::json!({
            "did": did,
            "time_us": time_us,
            "kind": "commit",
            "commit": {
                "operation": "create",
                "collection": shape,
                "rkey": format!("r{}", time_us),
                "record": {"$type": shape}
            }
        })
        .to_string()
    }

    fn config(dids: &[&str]) -> StreamConfig {
        StreamConfig {
            wanted_dids: dids.iter().map(|d| d.to_string()).collect(),
            ..StreamConfig::default()
        }
    }

    async fn settle<F: Fn() -> bool>(condition: F) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_lifecycle_quiet_until_started() {
        let client = StreamClient::new(Arc::new(ChannelTransport::new()), Arc::default(), &config(&[]));
        let mut lifecycle = client.lifecycle();
        let mut next = tokio_test::task::spawn(lifecycle.recv());
        tokio_test::assert_pending!(next.poll());
        assert_eq!(client.cursor(), None);
    }

    #[tokio::test]
    async fn test_start_dispatch_stop() {
        let transport = Arc::new(ChannelTransport::new());
        let bus = Arc::new(SubscriptionBus::new());
        let client = StreamClient::new(transport.clone(), bus.clone(), &config(&[]));
        let mut lifecycle = client.lifecycle();

        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let _sub = bus.subscribe("$type:app.bsky.feed.post", move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(client.state(), StreamState::Stopped);
        client.start().await.unwrap();
        assert_eq!(client.state(), StreamState::Streaming);
        assert_eq!(lifecycle.recv().await.unwrap(), StreamLifecycle::Connected);

        transport.push(commit("did:plc:a", 10, "app.bsky.feed.post"));
        transport.push(commit("did:plc:a", 11, "app.bsky.feed.like"));
        transport.push("garbage");
        settle(|| seen.load(Ordering::SeqCst) == 1).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        settle(|| client.cursor() == Some(11)).await;
        assert_eq!(client.cursor(), Some(11));

        client.stop().await;
        assert_eq!(client.state(), StreamState::Stopped);
        assert_eq!(transport.close_count(), 1);
        assert_eq!(transport.push(commit("did:plc:a", 12, "app.bsky.feed.post")), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(
            lifecycle.recv().await.unwrap(),
            StreamLifecycle::Disconnected {
                reason: "stopped".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_allow_list_drops_other_repositories() {
        let transport = Arc::new(ChannelTransport::new());
        let bus = Arc::new(SubscriptionBus::new());
        let client = StreamClient::new(transport.clone(), bus.clone(), &config(&["did:plc:a"]));

        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let _sub = bus.subscribe("collection:app.bsky.feed.post", move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        client.start().await.unwrap();
        assert_eq!(transport.last_request().unwrap().wanted_dids, vec!["did:plc:a"]);
        transport.push(commit("did:plc:b", 1, "app.bsky.feed.post"));
        transport.push(commit("did:plc:a", 2, "app.bsky.feed.post"));
        settle(|| client.cursor() == Some(2)).await;
        client.stop().await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_close_returns_to_stopped() {
        let transport = Arc::new(ChannelTransport::new());
        let client = StreamClient::new(transport.clone(), Arc::default(), &config(&[]));
        let mut lifecycle = client.lifecycle();

        client.start().await.unwrap();
        assert_eq!(lifecycle.recv().await.unwrap(), StreamLifecycle::Connected);
        transport.hang_up();
        assert_eq!(
            lifecycle.recv().await.unwrap(),
            StreamLifecycle::Disconnected {
                reason: "closed by server".to_string()
            }
        );
        settle(|| client.state() == StreamState::Stopped).await;
        assert_eq!(client.state(), StreamState::Stopped);

        // Caller restarts explicitly
        client.start().await.unwrap();
        assert_eq!(transport.connect_count(), 2);
        client.stop().await;
    }

    #[tokio::test]
    async fn test_connect_failure_reports_error() {
        let transport = Arc::new(ChannelTransport::new());
        transport.set_refuse(true);
        let client = StreamClient::new(transport, Arc::default(), &config(&[]));
        let mut lifecycle = client.lifecycle();

        assert!(client.start().await.is_err());
        assert_eq!(client.state(), StreamState::Stopped);
        assert!(matches!(
            lifecycle.recv().await.unwrap(),
            StreamLifecycle::Error { .. }
        ));
    }
}
