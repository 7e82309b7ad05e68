//! Live event stream
//!
//! A [`StreamClient`] holds one transport connection, decodes Jetstream
//! commit frames and hands each event to a [`SubscriptionBus`], which calls
//! the subscribers whose filter key matches. [`SharedStream`] lets many
//! consumers share one connection through reference counting.

mod bus;
mod client;
mod filter;
mod jetstream;
mod shared;
mod transport;

pub use bus::{
    EventCallback, Subscription, SubscriptionBus, GALLERY_COLLECTION, POST_SHAPE, STATUS_SHAPE,
};
pub use client::{StreamClient, StreamLifecycle, StreamState};
pub use filter::EventFilter;
pub use jetstream::{decode_frame, SubscribeRequest};
pub use shared::SharedStream;
pub use transport::{ChannelTransport, StreamConnection, StreamTransport, WebSocketTransport};
