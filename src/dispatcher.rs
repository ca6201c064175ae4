//! Single-call dispatch
//!
//! Resolves a handler slot and runs one action through it. The checks run in
//! a fixed order so callers can rely on which error wins:
//!
//! 1. slot lookup ([`ProtocolError::NoHandler`])
//! 2. full-payload validator, if bound ([`ProtocolError::Validation`])
//! 3. cancellation and deadline ([`ProtocolError::Cancelled`], [`ProtocolError::DeadlineExceeded`])
//! 4. action binding ([`ProtocolError::NotImplemented`])
//! 5. decode and per-item validation, then the handler method

use std::sync::Arc;
use tracing::trace;

use crate::codec::{Codec, ErasedPayload};
use crate::context::CallContext;
use crate::handler::Reply;
use crate::registry::HandlerRegistry;
use crate::types::Action;
use crate::{ProtocolError, Result};

/// Routes calls to registered handlers.
#[derive(Debug)]
pub struct Dispatcher<C: Codec> {
    registry: HandlerRegistry<C>,
    codec: Arc<C>,
}

impl<C: Codec> Dispatcher<C> {
    pub fn new(codec: Arc<C>, max_handlers: usize) -> Self {
        Self { registry: HandlerRegistry::new(max_handlers), codec }
    }

    pub fn registry(&self) -> &HandlerRegistry<C> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut HandlerRegistry<C> {
        &mut self.registry
    }

    /// Invoke `action` on the handler in slot `handler_id` with encoded `args`.
    pub async fn call_handler(
        &self,
        ctx: &CallContext,
        handler_id: u8,
        action: Action,
        args: &[Vec<u8>],
    ) -> Result<Reply<ErasedPayload<C>>> {
        let handler = self
            .registry
            .get(handler_id)
            .ok_or_else(|| ProtocolError::no_handler(handler_id, self.registry.len()))?;

        handler.validate(action, args)?;
        ctx.ensure_live(handler_id)?;

        if !handler.supports(action) {
            return Err(ProtocolError::NotImplemented {
                action: action.as_char(),
                handler: handler.name().to_string(),
            });
        }

        trace!(handler = handler.name(), %action, args = args.len(), "Calling handler");
        handler.invoke(&self.codec, ctx, action, args).await
    }
}
