//! Stream transports

use super::jetstream::SubscribeRequest;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Opens subscribed connections to an event stream
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn connect(&self, request: &SubscribeRequest) -> Result<Box<dyn StreamConnection>>;
}

/// One open connection yielding text frames
#[async_trait]
pub trait StreamConnection: Send {
    /// Next text frame; `None` once the peer has closed the connection
    async fn next_frame(&mut self) -> Option<Result<String>>;

    async fn close(&mut self) -> Result<()>;
}

// ============================================================================
// WebSocket
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Jetstream over WebSocket
pub struct WebSocketTransport {
    endpoint: String,
}

impl WebSocketTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    /// Endpoint with the subscription encoded as query parameters
    pub fn url_for(&self, request: &SubscribeRequest) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("Invalid stream endpoint {}: {}", self.endpoint, e)))?;
        {
            let mut query = url.query_pairs_mut();
            for collection in &request.wanted_collections {
                query.append_pair("wantedCollections", collection);
            }
            for did in &request.wanted_dids {
                query.append_pair("wantedDids", did);
            }
            if let Some(cursor) = request.cursor {
                query.append_pair("cursor", &cursor.to_string());
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl StreamTransport for WebSocketTransport {
    async fn connect(&self, request: &SubscribeRequest) -> Result<Box<dyn StreamConnection>> {
        let url = self.url_for(request)?;
        tracing::info!("Connecting to stream at {}", self.endpoint);

        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::Stream(format!("WebSocket connect failed: {}", e)))?;
        let (mut write, read) = ws.split();

        write
            .send(Message::Text(request.options_update()?))
            .await
            .map_err(|e| Error::Stream(format!("Subscribe request failed: {}", e)))?;

        Ok(Box::new(WebSocketConnection { write, read }))
    }
}

struct WebSocketConnection {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
}

/// What one inbound WebSocket message means for the reader
#[derive(Debug, PartialEq)]
enum Inbound {
    Frame(String),
    Skip,
    Closed,
}

/// Control messages and undecodable binary frames are skipped so that a
/// single bad frame never ends the connection.
fn classify(message: Message) -> Inbound {
    match message {
        Message::Text(text) => Inbound::Frame(text),
        Message::Binary(data) => match String::from_utf8(data) {
            Ok(text) => Inbound::Frame(text),
            Err(e) => {
                tracing::warn!("Skipping binary frame that is not UTF-8: {}", e);
                Inbound::Skip
            }
        },
        Message::Close(frame) => {
            tracing::info!("Stream closed by server: {:?}", frame);
            Inbound::Closed
        }
        _ => Inbound::Skip,
    }
}

#[async_trait]
impl StreamConnection for WebSocketConnection {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        loop {
            match self.read.next().await? {
                Ok(message) => match classify(message) {
                    Inbound::Frame(text) => return Some(Ok(text)),
                    Inbound::Skip => continue,
                    Inbound::Closed => return None,
                },
                Err(e) => return Some(Err(Error::Stream(format!("WebSocket error: {}", e)))),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.write
            .close()
            .await
            .map_err(|e| Error::Stream(format!("WebSocket close failed: {}", e)))
    }
}

// ============================================================================
// In-process channel
// ============================================================================

#[derive(Default)]
struct ChannelState {
    senders: Vec<mpsc::UnboundedSender<String>>,
    requests: Vec<SubscribeRequest>,
    refuse: bool,
}

/// In-process transport fed through [`ChannelTransport::push`]
#[derive(Default)]
pub struct ChannelTransport {
    state: Mutex<ChannelState>,
    closes: Arc<AtomicUsize>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver a frame to every open connection; returns how many got it
    pub fn push(&self, frame: impl Into<String>) -> usize {
        let frame = frame.into();
        let mut state = self.state();
        state.senders.retain(|tx| !tx.is_closed());
        state
            .senders
            .iter()
            .filter(|tx| tx.send(frame.clone()).is_ok())
            .count()
    }

    /// End every open connection as if the server went away
    pub fn hang_up(&self) {
        self.state().senders.clear();
    }

    /// Make subsequent connects fail
    pub fn set_refuse(&self, refuse: bool) {
        self.state().refuse = refuse;
    }

    pub fn connect_count(&self) -> usize {
        self.state().requests.len()
    }

    pub fn open_connections(&self) -> usize {
        self.state().senders.iter().filter(|tx| !tx.is_closed()).count()
    }

    /// Connections closed from the client side
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<SubscribeRequest> {
        self.state().requests.last().cloned()
    }
}

#[async_trait]
impl StreamTransport for ChannelTransport {
    async fn connect(&self, request: &SubscribeRequest) -> Result<Box<dyn StreamConnection>> {
        let mut state = self.state();
        if state.refuse {
            return Err(Error::Stream("connection refused".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.senders.push(tx);
        state.requests.push(request.clone());
        Ok(Box::new(ChannelConnection {
            rx,
            closes: self.closes.clone(),
        }))
    }
}

struct ChannelConnection {
    rx: mpsc::UnboundedReceiver<String>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl StreamConnection for ChannelConnection {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        self.rx.close();
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
