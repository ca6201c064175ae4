//! In-process channel hub backed by tokio broadcast channels

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, trace, warn};

use super::{ChannelMessage, ChannelSink};
use crate::config::ProtocolConfig;

/// Named broadcast channels for in-process subscribers.
///
/// Each channel is created on first subscription. Messages for a channel
/// nobody ever subscribed to, or whose subscribers are all gone, are dropped.
/// A delivery that finds no subscribers left also forgets the channel;
/// [`prune`](ChannelHub::prune) sweeps channels that never see another message.
#[derive(Debug)]
pub struct ChannelHub {
    channels: Mutex<HashMap<String, broadcast::Sender<ChannelMessage>>>,
    capacity: usize,
}

impl ChannelHub {
    /// Hub buffering up to `capacity` messages per channel.
    pub fn new(capacity: usize) -> Self {
        Self { channels: Mutex::new(HashMap::new()), capacity: capacity.max(1) }
    }

    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self::new(config.channel_capacity)
    }

    /// Subscribe to `channel`, creating it if needed.
    pub fn subscribe(&self, channel: &str) -> Subscription {
        let receiver = {
            let mut channels = self.lock();
            match channels.get(channel) {
                Some(sender) => sender.subscribe(),
                None => {
                    let (sender, receiver) = broadcast::channel(self.capacity);
                    channels.insert(channel.to_string(), sender);
                    debug!(channel, "Created channel");
                    receiver
                }
            }
        };
        Subscription { channel: channel.to_string(), inner: BroadcastStream::new(receiver) }
    }

    /// Live subscribers on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock().get(channel).map_or(0, broadcast::Sender::receiver_count)
    }

    /// Forget channels without subscribers. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut channels = self.lock();
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        before - channels.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<ChannelMessage>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChannelSink for ChannelHub {
    fn deliver(&self, message: ChannelMessage) {
        let mut channels = self.lock();
        let Some(sender) = channels.get(&message.channel) else {
            trace!(channel = %message.channel, "No such channel, dropping");
            return;
        };
        if let Err(broadcast::error::SendError(message)) = sender.send(message) {
            channels.remove(&message.channel);
            debug!(channel = %message.channel, "No subscribers left, removed channel");
        }
    }
}

pin_project! {
    /// Messages delivered to one channel.
    ///
    /// A subscriber that falls more than the hub capacity behind skips the
    /// missed messages and keeps receiving.
    pub struct Subscription {
        channel: String,
        #[pin]
        inner: BroadcastStream<ChannelMessage>,
    }
}

impl Subscription {
    /// Name of the subscribed channel.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Stream for Subscription {
    type Item = ChannelMessage;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(message)) => return Poll::Ready(Some(message)),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(channel = %this.channel, skipped, "Subscriber lagged, skipping messages");
                }
                None => return Poll::Ready(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Arc;

    fn message(channel: &str, byte: u8) -> ChannelMessage {
        ChannelMessage { channel: channel.to_string(), handler_id: 0, payload: Arc::from(vec![byte]) }
    }

    #[tokio::test]
    async fn subscribers_receive_only_their_channel() {
        let hub = ChannelHub::new(8);
        let mut u1 = hub.subscribe("u1");
        let mut u2 = hub.subscribe("u2");

        hub.deliver(message("u1", 1));
        hub.deliver(message("u2", 2));
        hub.deliver(message("u3", 3));

        assert_eq!(u1.next().await.map(|m| m.payload.to_vec()), Some(vec![1]));
        assert_eq!(u2.next().await.map(|m| m.payload.to_vec()), Some(vec![2]));
        assert_eq!(u1.channel(), "u1");
    }

    #[tokio::test]
    async fn every_subscriber_gets_a_copy() {
        let hub = ChannelHub::new(8);
        let mut first = hub.subscribe("room");
        let mut second = hub.subscribe("room");
        assert_eq!(hub.subscriber_count("room"), 2);

        hub.deliver(message("room", 7));
        assert_eq!(first.next().await, Some(message("room", 7)));
        assert_eq!(second.next().await, Some(message("room", 7)));
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_ahead() {
        let hub = ChannelHub::new(2);
        let mut slow = hub.subscribe("feed");

        for byte in 0..5 {
            hub.deliver(message("feed", byte));
        }

        assert_eq!(slow.next().await.map(|m| m.payload[0]), Some(3));
        assert_eq!(slow.next().await.map(|m| m.payload[0]), Some(4));
    }

    #[tokio::test]
    async fn prune_drops_abandoned_channels() {
        let hub = ChannelHub::new(4);
        let kept = hub.subscribe("kept");
        drop(hub.subscribe("gone"));

        assert_eq!(hub.prune(), 1);
        assert_eq!(hub.subscriber_count("gone"), 0);
        assert_eq!(hub.subscriber_count("kept"), 1);
        drop(kept);
    }

    #[tokio::test]
    async fn delivery_to_abandoned_channel_forgets_it() {
        let hub = ChannelHub::new(4);
        drop(hub.subscribe("gone"));

        hub.deliver(message("gone", 1));
        assert_eq!(hub.prune(), 0);

        let mut again = hub.subscribe("gone");
        hub.deliver(message("gone", 2));
        assert_eq!(again.next().await.map(|m| m.payload[0]), Some(2));
    }
}
