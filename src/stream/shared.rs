//! Reference-counted shared stream

use super::bus::SubscriptionBus;
use super::client::{StreamClient, StreamState};
use super::transport::StreamTransport;
use crate::config::StreamConfig;
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One stream connection shared by many consumers.
///
/// The connection opens on the first `start_shared` and closes when the
/// last consumer calls `stop_shared`. Calls are serialized, so concurrent
/// consumers never race to open or close the transport.
pub struct SharedStream {
    client: StreamClient,
    bus: Arc<SubscriptionBus>,
    refs: Mutex<usize>,
}

impl SharedStream {
    pub fn new(transport: Arc<dyn StreamTransport>, config: &StreamConfig) -> Self {
        let bus = Arc::new(SubscriptionBus::new());
        Self {
            client: StreamClient::new(transport, bus.clone(), config),
            bus,
            refs: Mutex::new(0),
        }
    }

    pub fn bus(&self) -> &SubscriptionBus {
        &self.bus
    }

    pub fn client(&self) -> &StreamClient {
        &self.client
    }

    /// Register a consumer, connecting on the first one.
    ///
    /// Also reconnects when the transport dropped while consumers remained.
    /// Returns the new consumer count; a failed connect leaves it unchanged.
    pub async fn start_shared(&self) -> Result<usize> {
        let mut refs = self.refs.lock().await;
        if *refs == 0 || self.client.state() == StreamState::Stopped {
            self.client.start().await?;
        }
        *refs += 1;
        tracing::debug!("Shared stream consumers: {}", *refs);
        Ok(*refs)
    }

    /// Release a consumer, disconnecting after the last one
    pub async fn stop_shared(&self) -> usize {
        let mut refs = self.refs.lock().await;
        if *refs == 0 {
            tracing::warn!("stop_shared called with no active consumers");
            return 0;
        }
        *refs -= 1;
        if *refs == 0 {
            self.client.stop().await;
        }
        tracing::debug!("Shared stream consumers: {}", *refs);
        *refs
    }

    pub async fn consumer_count(&self) -> usize {
        *self.refs.lock().await
    }
}
