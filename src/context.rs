//! Per-call context handed to handlers
//!
//! Carries the caller's cancellation token, an optional deadline, and an
//! optional user identity. The dispatcher checks cancellation and deadline
//! once, right before a handler method runs; handlers may keep checking
//! the token inside long operations.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{ProtocolError, Result};

/// Cancellation, deadline and identity for one batch invocation.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    user_id: Option<String>,
}

impl CallContext {
    /// A live context with no deadline and no user.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing cancellation token, typically a child of a connection token.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { cancel, ..Self::default() }
    }

    /// Set an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Attach the identity of the caller.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// The cancellation token for this call.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the caller cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel this context and every clone of it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Deadline, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Caller identity, if known.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Fail fast if the context is already done.
    pub(crate) fn ensure_live(&self, handler_id: u8) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ProtocolError::cancelled(handler_id));
        }
        if let Some(deadline) = self.deadline {
            let now = Instant::now();
            if now >= deadline {
                return Err(ProtocolError::DeadlineExceeded {
                    handler_id,
                    overrun: now.duration_since(deadline),
                });
            }
        }
        Ok(())
    }
}
