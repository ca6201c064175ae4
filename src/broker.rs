//! Outbound broker
//!
//! Accumulates outgoing operations and sends them as one batch once the
//! caller goes quiet for a configurable window.
//!
//! ## Lifecycle
//!
//! - **Idle**: empty queue, no timer
//! - **Accumulating**: at least one queued packet, timer armed
//! - **Flushing**: timer fired or [`Broker::flush_now`] was called
//!
//! Every enqueue rearms the timer (debounce), so a steady stream of
//! operations closer together than the window is held until the stream
//! pauses. Packets for the same handler and action are consolidated into a
//! single packet whose `data` grows in enqueue order.
//!
//! ## Callback
//!
//! The flush callback receives a [`FlushedBatch`]: the encoded
//! [`BatchRequest`](crate::BatchRequest) plus the queue entries it was built
//! from. It runs after the broker lock is released, so it may enqueue again or call into the broker without
//! deadlocking. It runs on the timer task for timed flushes and on the
//! caller's thread for [`Broker::flush_now`].
//!
//! When delivery fails, hand the entries back to [`Broker::requeue`]. Each
//! retried entry keeps its target user and gets its own queue slot, so it is
//! never merged with fresh operations or with another user's packets.
//!
//! If the outbound batch cannot be encoded, the queue is left intact and no
//! timer is armed; the next enqueue or [`Broker::flush_now`] tries again.
//!
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use crudwire::{Action, Broker, JsonCodec, ProtocolConfig};
//! use std::sync::Arc;
//!
//! let broker = Broker::new(Arc::new(JsonCodec), &ProtocolConfig::default());
//! broker.set_on_flush(|batch| println!("sending {} bytes", batch.bytes.len()));
//! broker.enqueue(0, Action::Create, "r1", br#"{"name":"Alice"}"#.to_vec());
//! broker.enqueue(0, Action::Create, "r2", br#"{"name":"Bob"}"#.to_vec());
//! assert_eq!(broker.len(), 1);
//! assert!(broker.flush_now());
//! # }
//! ```

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::codec::Codec;
use crate::config::ProtocolConfig;
use crate::types::{Action, BatchRequestRef, Packet};
use crate::Result;

/// Receives each outbound batch.
pub type FlushCallback = Arc<dyn Fn(FlushedBatch) + Send + Sync>;

/// One flushed batch: the encoded [`BatchRequest`](crate::BatchRequest) and
/// the entries it contains, in the same order.
#[derive(Debug, Clone)]
pub struct FlushedBatch {
    pub bytes: Vec<u8>,
    pub entries: Vec<QueuedPacket>,
}

/// A queued packet with its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPacket {
    pub packet: Packet,

    /// When the first argument of this packet was queued
    pub enqueued_at: Instant,

    /// Failed deliveries so far; non-zero entries are retries
    pub attempts: u32,

    /// User this packet is sent on behalf of
    pub target_user: Option<String>,
}

impl QueuedPacket {
    fn matches(&self, handler_id: u8, action: u8, target_user: Option<&str>) -> bool {
        self.attempts == 0
            && self.packet.handler_id == handler_id
            && self.packet.action == action
            && self.target_user.as_deref() == target_user
    }
}

#[derive(Default)]
struct BrokerState {
    queue: Vec<QueuedPacket>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
    on_flush: Option<FlushCallback>,
}

impl BrokerState {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }
}

struct BrokerInner<C> {
    codec: Arc<C>,
    window: Duration,
    retry_interval: Duration,
    max_retries: u32,
    state: Mutex<BrokerState>,
}

impl<C> Drop for BrokerInner<C> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }
}

/// Debouncing, consolidating outbound queue.
///
/// Cheap to clone; clones share one queue.
pub struct Broker<C: Codec> {
    inner: Arc<BrokerInner<C>>,
}

impl<C: Codec> Clone for Broker<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

/// Non-owning handle to a [`Broker`], for use inside its own flush callback.
pub struct WeakBroker<C: Codec> {
    inner: Weak<BrokerInner<C>>,
}

impl<C: Codec> WeakBroker<C> {
    /// The broker, unless every owning handle is gone.
    pub fn upgrade(&self) -> Option<Broker<C>> {
        self.inner.upgrade().map(|inner| Broker { inner })
    }
}

impl<C: Codec> Clone for WeakBroker<C> {
    fn clone(&self) -> Self {
        Self { inner: Weak::clone(&self.inner) }
    }
}

impl<C: Codec> Broker<C> {
    /// Broker using the window and retry settings from `config`.
    pub fn new(codec: Arc<C>, config: &ProtocolConfig) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                codec,
                window: config.batch_window(),
                retry_interval: config.retry_interval(),
                max_retries: config.max_retries,
                state: Mutex::new(BrokerState {
                    queue: Vec::with_capacity(16),
                    ..Default::default()
                }),
            }),
        }
    }

    /// Debounce window.
    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Install the callback that receives flushed batches, replacing any previous one.
    ///
    /// The broker owns the callback. A callback that captures a clone of this
    /// broker forms a reference cycle and keeps the queue alive forever;
    /// capture [`Broker::downgrade`] instead.
    pub fn set_on_flush<F>(&self, callback: F)
    where
        F: Fn(FlushedBatch) + Send + Sync + 'static,
    {
        self.inner.lock().on_flush = Some(Arc::new(callback));
    }

    /// Queue one encoded argument for `handler_id`/`action` and rearm the timer.
    ///
    /// When a packet for the same handler and action is already queued the
    /// argument is appended to it and `req_id` is not used. Retried entries
    /// are never extended.
    pub fn enqueue(
        &self,
        handler_id: u8,
        action: Action,
        req_id: impl Into<String>,
        data: Vec<u8>,
    ) {
        self.push(None, handler_id, action, req_id.into(), data);
    }

    /// Like [`enqueue`](Broker::enqueue), tagged with the user it is sent for.
    ///
    /// Packets for different users are never consolidated.
    pub fn enqueue_for(
        &self,
        user_id: impl Into<String>,
        handler_id: u8,
        action: Action,
        req_id: impl Into<String>,
        data: Vec<u8>,
    ) {
        self.push(Some(user_id.into()), handler_id, action, req_id.into(), data);
    }

    /// Encode `value` with the broker's codec and enqueue it.
    pub fn enqueue_value<T: Serialize + ?Sized>(
        &self,
        handler_id: u8,
        action: Action,
        req_id: impl Into<String>,
        value: &T,
    ) -> Result<()> {
        let data = self.inner.codec.encode(value)?;
        self.enqueue(handler_id, action, req_id, data);
        Ok(())
    }

    /// Put entries whose delivery failed back on the queue.
    ///
    /// Each entry counts one more failed attempt. Entries past `max_retries`
    /// are dropped; the rest keep their packet, target user and enqueue time
    /// and take a queue slot of their own. Requeued entries flush after the
    /// retry interval instead of the batch window. Returns the number of
    /// entries requeued.
    pub fn requeue(&self, entries: Vec<QueuedPacket>) -> usize {
        let max_retries = self.inner.max_retries;
        let mut state = self.inner.lock();
        let mut count = 0;

        for mut entry in entries {
            entry.attempts = entry.attempts.saturating_add(1);
            if entry.attempts > max_retries {
                warn!(
                    handler_id = entry.packet.handler_id,
                    req_id = %entry.packet.req_id,
                    attempts = entry.attempts,
                    max_retries,
                    "Dropping packet after too many delivery attempts"
                );
                continue;
            }
            state.queue.push(entry);
            count += 1;
        }

        if count > 0 {
            debug!(count, "Requeued packets");
            self.arm(&mut state, self.inner.retry_interval);
        }
        count
    }

    /// Weak handle that does not keep the queue alive.
    pub fn downgrade(&self) -> WeakBroker<C> {
        WeakBroker { inner: Arc::downgrade(&self.inner) }
    }

    /// Flush immediately, cancelling the pending timer.
    ///
    /// Returns whether a batch was produced; an empty queue never reaches
    /// the callback.
    pub fn flush_now(&self) -> bool {
        self.inner.flush(None)
    }

    /// Cancel the timer and discard everything queued without flushing.
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.cancel_timer();
        state.queue.clear();
    }

    /// Number of queued packets, after consolidation.
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    /// Copy of the current queue.
    pub fn snapshot(&self) -> Vec<QueuedPacket> {
        self.inner.lock().queue.clone()
    }

    fn push(
        &self,
        target_user: Option<String>,
        handler_id: u8,
        action: Action,
        req_id: String,
        data: Vec<u8>,
    ) {
        let code = action.code();
        let mut state = self.inner.lock();

        match state
            .queue
            .iter_mut()
            .find(|queued| queued.matches(handler_id, code, target_user.as_deref()))
        {
            Some(queued) => {
                queued.packet.data.push(data);
                trace!(handler_id, %action, args = queued.packet.data.len(), "Consolidated packet");
            }
            None => {
                trace!(handler_id, %action, %req_id, "Queued packet");
                state.queue.push(QueuedPacket {
                    packet: Packet { action: code, handler_id, req_id, data: vec![data] },
                    enqueued_at: Instant::now(),
                    attempts: 0,
                    target_user,
                });
            }
        }

        self.arm(&mut state, self.inner.window);
    }

    fn arm(&self, state: &mut BrokerState, delay: Duration) {
        state.cancel_timer();

        let Ok(runtime) = Handle::try_current() else {
            debug!("No tokio runtime, batch waits for flush_now");
            return;
        };

        let generation = state.generation;
        let inner: Weak<BrokerInner<C>> = Arc::downgrade(&self.inner);
        state.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.flush(Some(generation));
            }
        }));
    }
}

impl<C: Codec> BrokerInner<C> {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flush the queue. A timer passes its generation and is ignored if it
    /// has been superseded.
    fn flush(&self, timer_generation: Option<u64>) -> bool {
        let (batch, callback) = {
            let mut state = self.lock();
            match timer_generation {
                Some(generation) if generation != state.generation => return false,
                Some(_) => state.timer = None,
                None => state.cancel_timer(),
            }

            if state.queue.is_empty() {
                return false;
            }

            let batch = BatchRequestRef { packets: state.queue.iter().map(|q| &q.packet).collect() };
            let encoded = match self.codec.encode(&batch) {
                Ok(encoded) => encoded,
                Err(error) => {
                    warn!(%error, packets = state.queue.len(), "Failed to encode outbound batch");
                    return false;
                }
            };

            let entries = std::mem::take(&mut state.queue);
            (FlushedBatch { bytes: encoded, entries }, state.on_flush.clone())
        };

        let packets = batch.entries.len();
        match callback {
            Some(callback) => {
                debug!(packets, bytes = batch.bytes.len(), "Flushing outbound batch");
                callback(batch);
            }
            None => debug!(packets, "No flush callback, dropping outbound batch"),
        }
        true
    }
}

impl<C: Codec> std::fmt::Debug for Broker<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("window", &self.inner.window)
            .field("queued", &self.len())
            .finish_non_exhaustive()
    }
}
