//! Handlers and sinks shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use crudwire::{
    Action, CallContext, ChannelMessage, ChannelSink, Codec, Create, Handler, HandlerResult,
    JsonCodec, Protocol, ProtocolConfig, Read, Registration, Reply, Response, Validate,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
}

impl User {
    pub fn named(name: &str) -> Self {
        Self { id: 0, name: name.to_string() }
    }
}

/// Create assigns server ids, read echoes.
pub struct UserController;

impl Handler for UserController {
    type Input = User;
    type Output = User;
}

#[async_trait]
impl Create for UserController {
    async fn create(&self, _ctx: &CallContext, users: Vec<User>) -> HandlerResult<User> {
        Ok(Reply::Many(users.into_iter().map(|u| Response::new(User { id: 123, ..u })).collect()))
    }
}

#[async_trait]
impl Read for UserController {
    async fn read(&self, _ctx: &CallContext, users: Vec<User>) -> HandlerResult<User> {
        Ok(Reply::Many(users.into_iter().map(Response::new).collect()))
    }
}

/// Rejects empty argument lists; counts method calls.
#[derive(Default)]
pub struct Guarded {
    pub calls: AtomicUsize,
}

impl Handler for Guarded {
    type Input = User;
    type Output = User;
}

impl Validate for Guarded {
    fn validate(&self, _action: Action, args: &[Vec<u8>]) -> Result<(), String> {
        if args.is_empty() { Err("empty argument list".to_string()) } else { Ok(()) }
    }
}

#[async_trait]
impl Create for Guarded {
    async fn create(&self, _ctx: &CallContext, users: Vec<User>) -> HandlerResult<User> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Reply::Many(users.into_iter().map(Response::new).collect()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub recipient: String,
    pub body: String,
}

/// One broadcast alert per recipient, in recipient order.
pub struct Alerts;

impl Handler for Alerts {
    type Input = String;
    type Output = Alert;
}

#[async_trait]
impl Create for Alerts {
    async fn create(&self, _ctx: &CallContext, bodies: Vec<String>) -> HandlerResult<Alert> {
        let body = bodies.concat();
        let responses = ["u1", "u2"]
            .into_iter()
            .map(|recipient| {
                Response::new(Alert { recipient: recipient.to_string(), body: body.clone() })
                    .broadcast_to([recipient])
            })
            .collect();
        Ok(Reply::Many(responses))
    }
}

#[derive(Default)]
pub struct Recorder {
    messages: Mutex<Vec<ChannelMessage>>,
}

impl Recorder {
    pub fn messages(&self) -> Vec<ChannelMessage> {
        self.messages.lock().unwrap().clone()
    }
}

impl ChannelSink for Recorder {
    fn deliver(&self, message: ChannelMessage) {
        self.messages.lock().unwrap().push(message);
    }
}

pub fn encode_each<T: Serialize>(values: &[T]) -> Vec<Vec<u8>> {
    values.iter().map(|value| JsonCodec.encode(value).unwrap()).collect()
}

/// Slots: 0 users, 1 guarded, 2 alerts.
pub fn protocol() -> (Protocol<JsonCodec>, Arc<Guarded>, Arc<Recorder>) {
    init_tracing();
    let guarded = Arc::new(Guarded::default());
    let recorder = Arc::new(Recorder::default());

    let mut protocol = Protocol::with_codec(ProtocolConfig::default(), JsonCodec)
        .unwrap()
        .with_sink(recorder.clone());
    protocol
        .register([
            Registration::new(UserController).create().read().boxed(),
            Registration::from_arc(guarded.clone()).create().validated().boxed(),
            Registration::new(Alerts).create().boxed(),
        ])
        .unwrap();

    (protocol, guarded, recorder)
}
