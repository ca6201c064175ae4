//! Handler capabilities and reply types.
//!
//! A handler is any `Send + Sync` type implementing [`Handler`] plus one or
//! more capability traits:
//!
//! - [`Create`], [`Read`], [`Update`], [`Delete`]: the four CRUD methods
//! - [`Validate`]: full-payload check on the raw argument buffers, before decoding
//! - [`ValidateItem`]: per-argument check after decoding
//!
//! Capabilities are bound explicitly on a [`Registration`], and each binder
//! only exists when the handler implements that capability, so a registration
//! can never claim a method the handler lacks. Whatever is not bound fails at
//! dispatch time with [`ProtocolError::NotImplemented`](crate::ProtocolError::NotImplemented).
//!
//! # Example
//!
//! ```rust
//! use crudwire::{CallContext, Create, Handler, HandlerResult, Registration, Reply, Response};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct User { id: u64, name: String }
//!
//! struct UserController;
//!
//! impl Handler for UserController {
//!     type Input = User;
//!     type Output = User;
//! }
//!
//! #[async_trait::async_trait]
//! impl Create for UserController {
//!     async fn create(&self, _ctx: &CallContext, users: Vec<User>) -> HandlerResult<User> {
//!         let created = users
//!             .into_iter()
//!             .map(|user| Response::new(User { id: 123, ..user }))
//!             .collect();
//!         Ok(Reply::Many(created))
//!     }
//! }
//!
//! let registration = Registration::new(UserController).create();
//! assert_eq!(registration.name(), "user_controller");
//! ```

mod naming;
mod registration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::context::CallContext;
use crate::types::Action;

pub use naming::{handler_name_of, to_snake_case};
pub use registration::{BoundHandler, BoxedHandler, Registration};

/// Result of a handler method. Handler bodies report failures with `anyhow`.
pub type HandlerResult<T> = anyhow::Result<Reply<T>>;

/// Input and output types shared by a handler's capabilities.
pub trait Handler: Send + Sync + 'static {
    /// Type each argument buffer is decoded into
    type Input: DeserializeOwned + Send + 'static;

    /// Type of the values the handler returns
    type Output: Serialize + Send + 'static;
}

/// Handles [`Action::Create`].
#[async_trait]
pub trait Create: Handler {
    async fn create(&self, ctx: &CallContext, items: Vec<Self::Input>) -> HandlerResult<Self::Output>;
}

/// Handles [`Action::Read`].
#[async_trait]
pub trait Read: Handler {
    async fn read(&self, ctx: &CallContext, items: Vec<Self::Input>) -> HandlerResult<Self::Output>;
}

/// Handles [`Action::Update`].
#[async_trait]
pub trait Update: Handler {
    async fn update(&self, ctx: &CallContext, items: Vec<Self::Input>) -> HandlerResult<Self::Output>;
}

/// Handles [`Action::Delete`].
#[async_trait]
pub trait Delete: Handler {
    async fn delete(&self, ctx: &CallContext, items: Vec<Self::Input>) -> HandlerResult<Self::Output>;
}

/// Full-payload validation over the raw, still-encoded arguments.
///
/// Runs before anything is decoded and before the cancellation check.
pub trait Validate: Handler {
    fn validate(&self, action: Action, args: &[Vec<u8>]) -> Result<(), String>;
}

/// Validation of each decoded argument, run before the handler method.
pub trait ValidateItem: Handler {
    fn validate_item(&self, action: Action, item: &Self::Input) -> Result<(), String>;
}

/// What a handler method produced.
///
/// The batch processor turns each variant into output buffers:
/// `Empty` gives none, `Direct` and `Single` give one, `Many` gives one per
/// response in order.
#[derive(Debug)]
pub enum Reply<T> {
    /// Nothing to send back
    Empty,
    /// A plain value encoded as the only output
    Direct(T),
    /// One response that may also be routed to channels
    Single(Response<T>),
    /// Independent responses, e.g. one per notified recipient
    Many(Vec<Response<T>>),
}

impl<T> Reply<T> {
    /// Transform every carried value.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Reply<U> {
        match self {
            Reply::Empty => Reply::Empty,
            Reply::Direct(value) => Reply::Direct(f(value)),
            Reply::Single(response) => Reply::Single(response.map(f)),
            Reply::Many(responses) => {
                Reply::Many(responses.into_iter().map(|response| response.map(&mut f)).collect())
            }
        }
    }

    /// Number of output buffers this reply produces when it succeeds.
    pub fn output_count(&self) -> usize {
        match self {
            Reply::Empty => 0,
            Reply::Direct(_) | Reply::Single(_) => 1,
            Reply::Many(responses) => responses.len(),
        }
    }
}

/// A deliverable that may also be broadcast to named channels.
///
/// A response either carries data or the reason it failed. Channel names are
/// opaque to the protocol.
#[derive(Debug)]
pub struct Response<T> {
    outcome: Result<T, String>,
    targets: Vec<String>,
}

impl<T> Response<T> {
    /// A response with data and no broadcast targets.
    pub fn new(data: T) -> Self {
        Self { outcome: Ok(data), targets: Vec::new() }
    }

    /// A response reporting its own failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self { outcome: Err(reason.into()), targets: Vec::new() }
    }

    /// Add broadcast targets.
    pub fn broadcast_to<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets.extend(targets.into_iter().map(Into::into));
        self
    }

    /// Broadcast targets.
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Split into `(data, targets)`, or the failure reason.
    pub fn into_parts(self) -> Result<(T, Vec<String>), String> {
        let data = self.outcome?;
        Ok((data, self.targets))
    }

    /// Transform the carried data.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response { outcome: self.outcome.map(f), targets: self.targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_map_preserves_shape_and_order() {
        let reply = Reply::Many(vec![
            Response::new(1).broadcast_to(["u1"]),
            Response::failed("nope"),
            Response::new(3),
        ]);
        let mapped = reply.map(|n| n * 10);
        assert_eq!(mapped.output_count(), 3);

        let Reply::Many(responses) = mapped else { panic!("shape changed") };
        let parts: Vec<_> = responses.into_iter().map(Response::into_parts).collect();
        assert_eq!(parts[0], Ok((10, vec!["u1".to_string()])));
        assert_eq!(parts[1], Err("nope".to_string()));
        assert_eq!(parts[2], Ok((30, Vec::new())));
    }

    #[test]
    fn output_counts() {
        assert_eq!(Reply::<u8>::Empty.output_count(), 0);
        assert_eq!(Reply::Direct(1).output_count(), 1);
        assert_eq!(Reply::Single(Response::new(1)).output_count(), 1);
        assert_eq!(Reply::<u8>::Many(Vec::new()).output_count(), 0);
    }

    #[test]
    fn broadcast_targets_accumulate() {
        let response = Response::new(()).broadcast_to(["a"]).broadcast_to(vec!["b".to_string()]);
        assert_eq!(response.targets(), ["a", "b"]);
    }
}
