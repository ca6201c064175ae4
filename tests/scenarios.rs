//! End-to-end batch processing scenarios

mod common;

use common::{Alert, User, encode_each, protocol};
use crudwire::{
    Action, BatchRequest, CallContext, Codec, JsonCodec, MessageType, Packet, Protocol,
    ProtocolConfig, ProtocolError, Registration,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;

async fn process(protocol: &Protocol<JsonCodec>, packets: Vec<Packet>) -> crudwire::BatchResponse {
    let request = JsonCodec.encode(&BatchRequest { packets }).unwrap();
    let response = protocol.process_batch(&CallContext::new(), &request).await.unwrap();
    protocol.decode_response(&response).unwrap()
}

#[tokio::test]
async fn create_returns_server_assigned_record() {
    let (protocol, _, _) = protocol();
    let packet =
        Packet::new(Action::Create, 0, "r1").with_data(encode_each(&[User::named("Alice")]));

    let response = process(&protocol, vec![packet]).await;

    assert_eq!(response.results.len(), 1);
    let result = &response.results[0];
    assert_eq!(result.req_id, "r1");
    assert_eq!(result.message_type, MessageType::Success);
    assert_eq!(result.message, "OK");
    assert_eq!(result.data.len(), 1);

    let user: User = JsonCodec.decode(&result.data[0]).unwrap();
    assert_eq!(user, User { id: 123, name: "Alice".to_string() });
}

#[tokio::test]
async fn unknown_handler_fails_with_request_id() {
    let mut protocol = Protocol::with_codec(ProtocolConfig::default(), JsonCodec).unwrap();
    protocol.register([Registration::new(common::UserController).create().boxed()]).unwrap();

    let response = process(&protocol, vec![Packet::new(Action::Create, 99, "missing")]).await;

    let result = &response.results[0];
    assert_eq!(result.message_type, MessageType::Error);
    assert!(result.message.contains("no handler"), "{}", result.message);
    assert_eq!(result.req_id, "missing");
    assert_eq!(result.handler_id, 99);
}

#[tokio::test]
async fn validator_rejects_before_method_runs() {
    let (protocol, guarded, _) = protocol();

    let response = process(&protocol, vec![Packet::new(Action::Create, 1, "empty")]).await;

    let result = &response.results[0];
    assert!(result.is_error());
    assert!(result.message.contains("validation failed"), "{}", result.message);
    assert_eq!(guarded.calls.load(Ordering::SeqCst), 0);

    let error = protocol.call_handler(&CallContext::new(), 1, Action::Create, &[]).await.err();
    assert!(matches!(error, Some(ProtocolError::Validation { .. })));
    assert_eq!(guarded.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn broadcast_responses_reach_each_channel() {
    let (protocol, _, recorder) = protocol();
    let packet =
        Packet::new(Action::Create, 2, "alert").with_data(encode_each(&["server restarting"]));

    let response = process(&protocol, vec![packet]).await;

    let result = &response.results[0];
    assert_eq!(result.data.len(), 2);
    let alerts: Vec<Alert> = result.data.iter().map(|d| JsonCodec.decode(d).unwrap()).collect();
    assert_eq!(alerts[0].recipient, "u1");
    assert_eq!(alerts[1].recipient, "u2");

    let messages = recorder.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].channel, "u1");
    assert_eq!(messages[1].channel, "u2");
    assert_eq!(&*messages[0].payload, result.data[0].as_slice());
    assert_eq!(&*messages[1].payload, result.data[1].as_slice());
    assert!(messages.iter().all(|m| m.handler_id == 2));
}

#[tokio::test]
async fn one_bad_packet_does_not_abort_the_batch() {
    let (protocol, _, _) = protocol();

    for bad_index in 0..5 {
        let packets: Vec<Packet> = (0..5)
            .map(|i| {
                let handler_id = if i == bad_index { 200 } else { 0 };
                Packet::new(Action::Create, handler_id, format!("r{i}"))
                    .with_data(encode_each(&[User::named("Eve")]))
            })
            .collect();

        let response = process(&protocol, packets).await;

        assert_eq!(response.results.len(), 5);
        let errors: Vec<_> = response.results.iter().filter(|r| r.is_error()).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].req_id, format!("r{bad_index}"));
        assert!(
            response
                .results
                .iter()
                .filter(|r| !r.is_error())
                .all(|r| r.message_type == MessageType::Success)
        );
    }
}

#[tokio::test]
async fn cancellation_fails_each_packet_independently() {
    let (protocol, guarded, _) = protocol();
    let ctx = CallContext::new();
    ctx.cancel();

    let packets = vec![
        Packet::new(Action::Create, 0, "a").with_data(encode_each(&[User::named("A")])),
        Packet::new(Action::Create, 1, "b").with_data(encode_each(&[User::named("B")])),
    ];
    let request = JsonCodec.encode(&BatchRequest { packets }).unwrap();
    let response = protocol.process_batch(&ctx, &request).await.unwrap();
    let response = protocol.decode_response(&response).unwrap();

    assert_eq!(response.results.len(), 2);
    assert!(response.results.iter().all(|r| r.is_error() && r.message.contains("cancelled")));
    assert_eq!(guarded.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unimplemented_action_is_reported() {
    let (protocol, _, _) = protocol();
    let response = process(&protocol, vec![Packet::new(Action::Delete, 0, "d1")]).await;
    assert_eq!(
        response.results[0].message,
        "action 'd' not implemented for handler user_controller"
    );
}

#[tokio::test]
async fn concurrent_batches_share_one_protocol() {
    let (protocol, _, _) = protocol();
    let protocol = Arc::new(protocol);

    let tasks: Vec<_> = (0..8)
        .map(|n| {
            let protocol = Arc::clone(&protocol);
            tokio::spawn(async move {
                let name = format!("user{n}");
                let packet = Packet::new(Action::Read, 0, name.clone())
                    .with_data(encode_each(&[User::named(&name)]));
                let response = process(&protocol, vec![packet]).await;
                let user: User = JsonCodec.decode(&response.results[0].data[0]).unwrap();
                assert_eq!(user.name, name);
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn binary_codec_end_to_end() {
    let config = ProtocolConfig { codec: crudwire::CodecKind::Binary, ..Default::default() };
    let mut protocol = Protocol::new(config).unwrap();
    protocol.register([Registration::new(common::UserController).create().boxed()]).unwrap();

    let request = protocol
        .encode_packet(Action::Create, 0, "bin", &[User::named("Bo")])
        .unwrap();
    let reply = protocol.process_packet(&CallContext::new(), &request).await.unwrap();
    let packet = protocol.decode_packet(&reply).unwrap();
    let user: User = protocol.decode_data(&packet, 0).unwrap();

    assert_eq!(user.id, 123);
    assert!(JsonCodec.decode::<Packet>(&reply).is_err());
}
