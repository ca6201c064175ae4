//! The protocol instance shared by the server entry point and the client broker

use std::sync::Arc;

use crate::broker::Broker;
use crate::codec::{Codec, ErasedPayload, WireCodec};
use crate::config::ProtocolConfig;
use crate::context::CallContext;
use crate::dispatcher::Dispatcher;
use crate::handler::{BoxedHandler, Reply};
use crate::registry::HandlerRegistry;
use crate::router::{ChannelSink, NullSink, ResultRouter};
use crate::types::Action;
use crate::Result;

/// One protocol instance: configuration, codec, handler table and router.
///
/// Construct it once at startup, register handlers, then share it by
/// reference (or inside an `Arc`) with every entry point. Registration takes
/// `&mut self`, so it cannot overlap with dispatch.
pub struct Protocol<C: Codec = WireCodec> {
    pub(crate) config: ProtocolConfig,
    pub(crate) codec: Arc<C>,
    pub(crate) dispatcher: Dispatcher<C>,
    pub(crate) router: ResultRouter<C>,
}

impl Protocol<WireCodec> {
    /// Protocol using the codec named in `config`.
    pub fn new(config: ProtocolConfig) -> Result<Self> {
        let codec = WireCodec::from_kind(config.codec);
        Self::with_codec(config, codec)
    }
}

impl<C: Codec> Protocol<C> {
    /// Protocol using a custom codec. `config.codec` is ignored.
    pub fn with_codec(config: ProtocolConfig, codec: C) -> Result<Self> {
        config.validate()?;
        let codec = Arc::new(codec);
        Ok(Self {
            dispatcher: Dispatcher::new(Arc::clone(&codec), config.max_handlers),
            router: ResultRouter::new(Arc::clone(&codec), Arc::new(NullSink)),
            codec,
            config,
        })
    }

    /// Deliver broadcast responses to `sink` instead of discarding them.
    pub fn with_sink(mut self, sink: Arc<dyn ChannelSink>) -> Self {
        self.router = ResultRouter::new(Arc::clone(&self.codec), sink);
        self
    }

    /// Replace the handler table. Handler ids follow the order of `handlers`.
    pub fn register<I>(&mut self, handlers: I) -> Result<()>
    where
        I: IntoIterator<Item = BoxedHandler<C>>,
    {
        self.dispatcher.registry_mut().register(handlers)
    }

    /// Name of the handler at `index`, or `""` when out of range.
    pub fn handler_name(&self, index: usize) -> &str {
        self.dispatcher.registry().handler_name(index)
    }

    /// Slot of the handler registered under `name`.
    pub fn handler_id(&self, name: &str) -> Option<u8> {
        self.dispatcher.registry().handler_id(name)
    }

    pub fn registry(&self) -> &HandlerRegistry<C> {
        self.dispatcher.registry()
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn router(&self) -> &ResultRouter<C> {
        &self.router
    }

    /// New outbound broker sharing this protocol's codec and settings.
    pub fn broker(&self) -> Broker<C> {
        Broker::new(Arc::clone(&self.codec), &self.config)
    }

    /// Invoke one action on one handler. See [`Dispatcher::call_handler`].
    pub async fn call_handler(
        &self,
        ctx: &CallContext,
        handler_id: u8,
        action: Action,
        args: &[Vec<u8>],
    ) -> Result<Reply<ErasedPayload<C>>> {
        self.dispatcher.call_handler(ctx, handler_id, action, args).await
    }
}

impl<C: Codec> std::fmt::Debug for Protocol<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protocol")
            .field("codec", &self.codec.name())
            .field("config", &self.config)
            .field("registry", self.dispatcher.registry())
            .finish()
    }
}
