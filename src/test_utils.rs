//! Handler fixtures shared by unit tests and benchmarks
//!
//! [`fixture_protocol`] registers, in slot order:
//!
//! 0. [`UserHandler`]: create assigns id 123, read echoes, delete returns nothing
//! 1. [`StrictHandler`]: rejects empty argument lists and counts what it sees
//! 2. [`NotifyHandler`]: create broadcasts one notice per recipient; update
//!    returns a sequence whose second response fails
//! 3. [`BulletinHandler`]: read broadcasts one bulletin to `all`; create
//!    returns a value the JSON codec cannot encode

#![cfg(any(test, feature = "benchmark"))]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::codec::{Codec, JsonCodec};
use crate::config::ProtocolConfig;
use crate::context::CallContext;
use crate::handler::{
    Create, Delete, Handler, HandlerResult, Read, Registration, Reply, Response, Update, Validate,
};
use crate::protocol::Protocol;
use crate::router::{ChannelMessage, ChannelSink};
use crate::types::Action;

/// Record used by the user fixtures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
}

impl User {
    /// A user without an id, as a client would send it.
    pub fn named(name: &str) -> Self {
        Self { id: 0, name: name.to_string(), email: format!("{}@example.com", name.to_lowercase()) }
    }
}

/// Create/read/delete over [`User`] records.
pub struct UserHandler;

impl Handler for UserHandler {
    type Input = User;
    type Output = User;
}

#[async_trait]
impl Create for UserHandler {
    async fn create(&self, _ctx: &CallContext, users: Vec<User>) -> HandlerResult<User> {
        Ok(Reply::Many(users.into_iter().map(|user| Response::new(User { id: 123, ..user })).collect()))
    }
}

#[async_trait]
impl Read for UserHandler {
    async fn read(&self, _ctx: &CallContext, users: Vec<User>) -> HandlerResult<User> {
        Ok(Reply::Many(users.into_iter().map(Response::new).collect()))
    }
}

#[async_trait]
impl Delete for UserHandler {
    async fn delete(&self, _ctx: &CallContext, _users: Vec<User>) -> HandlerResult<User> {
        Ok(Reply::Empty)
    }
}

/// Validated handler with side-effect counters.
#[derive(Debug, Default)]
pub struct StrictHandler {
    pub validations: AtomicUsize,
    pub calls: AtomicUsize,
}

impl Handler for StrictHandler {
    type Input = User;
    type Output = usize;
}

impl Validate for StrictHandler {
    fn validate(&self, _action: Action, args: &[Vec<u8>]) -> Result<(), String> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        if args.is_empty() { Err("at least one user is required".to_string()) } else { Ok(()) }
    }
}

#[async_trait]
impl Create for StrictHandler {
    async fn create(&self, _ctx: &CallContext, users: Vec<User>) -> HandlerResult<usize> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Reply::Direct(users.len()))
    }
}

/// Notification delivered to one recipient channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub to: String,
    pub text: String,
}

/// Broadcasts one [`Notice`] per recipient.
pub struct NotifyHandler {
    pub recipients: Vec<String>,
}

impl Default for NotifyHandler {
    fn default() -> Self {
        Self { recipients: vec!["u1".to_string(), "u2".to_string()] }
    }
}

impl NotifyHandler {
    fn notices(&self, texts: &[String]) -> impl Iterator<Item = Notice> + '_ {
        let text = texts.join(" ");
        self.recipients.iter().map(move |to| Notice { to: to.clone(), text: text.clone() })
    }
}

impl Handler for NotifyHandler {
    type Input = String;
    type Output = Notice;
}

#[async_trait]
impl Create for NotifyHandler {
    async fn create(&self, _ctx: &CallContext, texts: Vec<String>) -> HandlerResult<Notice> {
        let responses = self
            .notices(&texts)
            .map(|notice| {
                let to = notice.to.clone();
                Response::new(notice).broadcast_to([to])
            })
            .collect();
        Ok(Reply::Many(responses))
    }
}

#[async_trait]
impl Update for NotifyHandler {
    async fn update(&self, _ctx: &CallContext, texts: Vec<String>) -> HandlerResult<Notice> {
        let mut responses: Vec<Response<Notice>> = self
            .notices(&texts)
            .map(|notice| {
                let to = notice.to.clone();
                Response::new(notice).broadcast_to([to])
            })
            .collect();
        if let Some(second) = responses.get_mut(1) {
            *second = Response::failed("recipient unreachable");
        }
        Ok(Reply::Many(responses))
    }
}

/// Output of [`BulletinHandler`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Bulletin {
    Text(String),
    /// Byte-string map keys, which JSON cannot represent
    ByKey(HashMap<Vec<u8>, String>),
}

/// Single-response broadcast on read, unencodable output on create.
pub struct BulletinHandler;

impl Handler for BulletinHandler {
    type Input = String;
    type Output = Bulletin;
}

#[async_trait]
impl Create for BulletinHandler {
    async fn create(&self, _ctx: &CallContext, texts: Vec<String>) -> HandlerResult<Bulletin> {
        let by_key = texts.into_iter().map(|text| (text.clone().into_bytes(), text)).collect();
        Ok(Reply::Direct(Bulletin::ByKey(by_key)))
    }
}

#[async_trait]
impl Read for BulletinHandler {
    async fn read(&self, _ctx: &CallContext, texts: Vec<String>) -> HandlerResult<Bulletin> {
        let bulletin = Bulletin::Text(texts.join("\n"));
        Ok(Reply::Single(Response::new(bulletin).broadcast_to(["all"])))
    }
}

/// Sink that keeps every delivered message.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<ChannelMessage>>,
}

impl RecordingSink {
    /// Messages delivered so far, in delivery order.
    pub fn messages(&self) -> Vec<ChannelMessage> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ChannelSink for RecordingSink {
    fn deliver(&self, message: ChannelMessage) {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).push(message);
    }
}

/// Encode each value separately, as packet arguments.
pub fn encode_all<C: Codec, T: Serialize>(codec: &C, values: &[T]) -> Vec<Vec<u8>> {
    values.iter().map(|value| codec.encode(value).expect("fixture value must encode")).collect()
}

/// JSON protocol with the fixture handlers and a recording sink.
pub fn fixture_protocol() -> (Protocol<JsonCodec>, Arc<RecordingSink>) {
    fixture_protocol_with(JsonCodec)
}

/// Fixture protocol over any codec.
pub fn fixture_protocol_with<C: Codec>(codec: C) -> (Protocol<C>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let mut protocol = Protocol::with_codec(ProtocolConfig::default(), codec)
        .expect("default config is valid")
        .with_sink(sink.clone());
    protocol
        .register([
            Registration::new(UserHandler).create().read().delete().boxed(),
            Registration::new(StrictHandler::default()).create().validated().boxed(),
            Registration::new(NotifyHandler::default()).create().update().boxed(),
            Registration::new(BulletinHandler).create().read().boxed(),
        ])
        .expect("fixture handlers fit the default registry");
    (protocol, sink)
}
