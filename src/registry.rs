//! Positional handler table
//!
//! Handler ids are slot positions: the n-th registered handler answers to
//! id `n`. Both peers must therefore register the same handlers in the same
//! order.

use tracing::{debug, info, warn};

use crate::codec::Codec;
use crate::handler::{BoundHandler, BoxedHandler};
use crate::{ProtocolError, Result};

/// Ordered, capacity-bounded set of registered handlers.
pub struct HandlerRegistry<C: Codec> {
    slots: Vec<BoxedHandler<C>>,
    capacity: usize,
}

impl<C: Codec> HandlerRegistry<C> {
    /// Empty registry holding at most `capacity` handlers.
    pub fn new(capacity: usize) -> Self {
        Self { slots: Vec::new(), capacity }
    }

    /// Replace the whole table with `handlers`, assigning ids by position.
    ///
    /// The previous table is kept when registration fails.
    pub fn register<I>(&mut self, handlers: I) -> Result<()>
    where
        I: IntoIterator<Item = BoxedHandler<C>>,
    {
        let handlers: Vec<BoxedHandler<C>> = handlers.into_iter().collect();

        if handlers.len() > self.capacity {
            return Err(ProtocolError::registration(format!(
                "{} handlers exceed the limit of {}",
                handlers.len(),
                self.capacity
            )));
        }

        if let Some(index) = handlers.iter().position(|handler| handler.name().is_empty()) {
            return Err(ProtocolError::registration(format!("handler {index} has an empty name")));
        }

        for (index, handler) in handlers.iter().enumerate() {
            if handlers[..index].iter().any(|earlier| earlier.name() == handler.name()) {
                warn!(name = handler.name(), handler_id = index, "Duplicate handler name");
            }
        }

        if !self.slots.is_empty() {
            debug!(previous = self.slots.len(), "Replacing handler table");
        }

        for (index, handler) in handlers.iter().enumerate() {
            info!(
                handler_id = index,
                name = handler.name(),
                actions = ?handler.actions(),
                "Registered handler"
            );
        }

        self.slots = handlers;
        Ok(())
    }

    /// Handler in slot `handler_id`.
    pub fn get(&self, handler_id: u8) -> Option<&dyn BoundHandler<C>> {
        self.slots.get(usize::from(handler_id)).map(|handler| &**handler)
    }

    /// Name of the handler at `index`, or `""` when out of range.
    pub fn handler_name(&self, index: usize) -> &str {
        self.slots.get(index).map_or("", |handler| handler.name())
    }

    /// Slot of the first handler registered under `name`.
    pub fn handler_id(&self, name: &str) -> Option<u8> {
        self.slots
            .iter()
            .position(|handler| handler.name() == name)
            .and_then(|index| u8::try_from(index).ok())
    }

    /// Registered names in slot order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|handler| handler.name())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Maximum number of handlers.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<C: Codec> std::fmt::Debug for HandlerRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names().collect::<Vec<_>>())
            .field("capacity", &self.capacity)
            .finish()
    }
}
