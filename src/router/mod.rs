//! Result routing to named channels
//!
//! Responses that carry broadcast targets are encoded once and handed to a
//! [`ChannelSink`] once per target. The sink is the push transport (an SSE
//! writer, a websocket fan-out, or the in-process [`ChannelHub`]).
//!
//! Routing is a side channel: failures are logged and never change the
//! outcome of the packet that produced the response.

mod hub;

use std::sync::Arc;
use tracing::{trace, warn};

use crate::codec::{Codec, Payload};

pub use hub::{ChannelHub, Subscription};

/// One encoded payload addressed to one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    /// Target channel name
    pub channel: String,

    /// Slot of the handler that produced the payload
    pub handler_id: u8,

    /// Encoded payload, shared between every target of the same response
    pub payload: Arc<[u8]>,
}

/// Receives routed messages.
///
/// Implementations must not block; a slow consumer should buffer or drop.
pub trait ChannelSink: Send + Sync + 'static {
    fn deliver(&self, message: ChannelMessage);
}

/// Sink that discards everything. Used until a real sink is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ChannelSink for NullSink {
    fn deliver(&self, message: ChannelMessage) {
        trace!(channel = %message.channel, handler_id = message.handler_id, "No sink attached, dropping");
    }
}

/// Encodes broadcast responses once and fans them out to their targets.
pub struct ResultRouter<C: Codec> {
    codec: Arc<C>,
    sink: Arc<dyn ChannelSink>,
}

impl<C: Codec> ResultRouter<C> {
    pub fn new(codec: Arc<C>, sink: Arc<dyn ChannelSink>) -> Self {
        Self { codec, sink }
    }

    /// The sink messages are delivered to.
    pub fn sink(&self) -> &Arc<dyn ChannelSink> {
        &self.sink
    }

    /// Encode `payload` once and deliver it to every channel in `targets`.
    ///
    /// Returns the number of deliveries; an encode failure is logged and
    /// delivers nothing.
    pub fn route_to_channels(
        &self,
        payload: &dyn Payload<C>,
        targets: &[String],
        handler_id: u8,
    ) -> usize {
        if targets.is_empty() {
            return 0;
        }
        match payload.encode_with(&self.codec) {
            Ok(bytes) => self.fan_out(bytes.into(), targets, handler_id),
            Err(error) => {
                warn!(handler_id, targets = targets.len(), %error, "Failed to encode broadcast payload");
                0
            }
        }
    }

    /// Deliver already-encoded bytes to every channel in `targets`.
    pub fn fan_out(&self, payload: Arc<[u8]>, targets: &[String], handler_id: u8) -> usize {
        for channel in targets {
            trace!(%channel, handler_id, bytes = payload.len(), "Routing payload");
            self.sink.deliver(ChannelMessage {
                channel: channel.clone(),
                handler_id,
                payload: Arc::clone(&payload),
            });
        }
        targets.len()
    }
}

impl<C: Codec> std::fmt::Debug for ResultRouter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultRouter").field("codec", &self.codec.name()).finish_non_exhaustive()
    }
}
