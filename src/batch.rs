//! Batch processing
//!
//! [`Protocol::process_batch`] is the transport entry point: raw request bytes
//! in, raw response bytes out. Packets run in input order and each one gets
//! exactly one [`PacketResult`], so the response always has as many results
//! as the request had packets.
//!
//! ## Result normalization
//!
//! | Handler reply        | Output buffers                      | Routed |
//! |----------------------|-------------------------------------|--------|
//! | `Reply::Empty`       | none                                | no     |
//! | `Reply::Direct(v)`   | `v` encoded                         | no     |
//! | `Reply::Single(r)`   | `r`'s data encoded                  | to `r`'s targets |
//! | `Reply::Many(rs)`    | one per response, in order          | each to its own targets |
//!
//! If any response in a `Many` reports its own failure, or cannot be encoded,
//! the whole packet becomes an Error result with no data. Responses are only
//! routed once every response of the packet has been encoded, so a failed
//! packet never reaches a channel.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::codec::{Codec, ErasedPayload};
use crate::context::CallContext;
use crate::handler::{Reply, Response};
use crate::protocol::Protocol;
use crate::types::{Action, BatchRequest, BatchRequestRef, BatchResponse, Packet, PacketResult};
use crate::{ProtocolError, Result};

/// Correlation token of the result returned for an undecodable batch.
pub const DECODE_ERROR_REQ_ID: &str = "decode_error";

/// One encoded output and the channels it goes to.
struct Encoded {
    bytes: Vec<u8>,
    targets: Vec<String>,
}

impl<C: Codec> Protocol<C> {
    /// Decode a [`BatchRequest`], run every packet, and encode the [`BatchResponse`].
    ///
    /// Per-packet failures become Error results. An undecodable request yields
    /// a one-result response with `req_id` [`DECODE_ERROR_REQ_ID`]. Only a
    /// failure to encode the response itself is returned as `Err`.
    pub async fn process_batch(&self, ctx: &CallContext, request: &[u8]) -> Result<Vec<u8>> {
        let batch: BatchRequest = match self.codec.decode(request) {
            Ok(batch) => batch,
            Err(error) => {
                warn!(%error, bytes = request.len(), "Failed to decode batch request");
                return self.error_response(DECODE_ERROR_REQ_ID, &error);
            }
        };

        debug!(packets = batch.packets.len(), "Processing batch");
        let mut results = Vec::with_capacity(batch.packets.len());
        for packet in &batch.packets {
            results.push(self.process_one(ctx, packet).await);
        }

        self.codec.encode(&BatchResponse { results })
    }

    /// Run one encoded [`Packet`] through [`process_batch`](Protocol::process_batch).
    ///
    /// Returns the encoded response packet (same identity, output data), or
    /// [`ProtocolError::Remote`] when the packet failed.
    pub async fn process_packet(&self, ctx: &CallContext, packet: &[u8]) -> Result<Vec<u8>> {
        let packet: Packet = self.codec.decode(packet)?;
        let request = self.codec.encode(&BatchRequestRef { packets: vec![&packet] })?;
        let response: BatchResponse = self.codec.decode(&self.process_batch(ctx, &request).await?)?;

        let [result]: [PacketResult; 1] =
            response.results.try_into().map_err(|results: Vec<PacketResult>| {
                ProtocolError::decode(
                    "single packet response",
                    format!("expected one result, got {}", results.len()),
                )
            })?;

        if result.is_error() {
            return Err(ProtocolError::Remote { req_id: result.req_id, message: result.message });
        }

        self.codec.encode(&Packet {
            action: packet.action,
            handler_id: packet.handler_id,
            req_id: result.req_id,
            data: result.data,
        })
    }

    /// Build and encode a packet whose arguments are `items`, each encoded separately.
    pub fn encode_packet<T: Serialize>(
        &self,
        action: Action,
        handler_id: u8,
        req_id: impl Into<String>,
        items: &[T],
    ) -> Result<Vec<u8>> {
        let data = items.iter().map(|item| self.codec.encode(item)).collect::<Result<Vec<_>>>()?;
        self.codec.encode(&Packet::new(action, handler_id, req_id).with_data(data))
    }

    /// Decode a packet.
    pub fn decode_packet(&self, bytes: &[u8]) -> Result<Packet> {
        self.codec.decode(bytes)
    }

    /// Decode the `index`-th data buffer of `packet` into a fresh `T`.
    pub fn decode_data<T: DeserializeOwned>(&self, packet: &Packet, index: usize) -> Result<T> {
        let bytes = packet.data.get(index).ok_or_else(|| {
            ProtocolError::decode(
                format!("packet {}", packet.req_id),
                format!("data index {index} out of range ({} buffers)", packet.data.len()),
            )
        })?;
        self.codec.decode(bytes)
    }

    /// Encode a batch of packets.
    pub fn encode_batch(&self, packets: &[Packet]) -> Result<Vec<u8>> {
        self.codec.encode(&BatchRequestRef { packets: packets.iter().collect() })
    }

    /// Decode a batch response.
    pub fn decode_response(&self, bytes: &[u8]) -> Result<BatchResponse> {
        self.codec.decode(bytes)
    }

    async fn process_one(&self, ctx: &CallContext, packet: &Packet) -> PacketResult {
        let mut result = PacketResult::for_packet(packet);
        match self.run_packet(ctx, packet).await {
            Ok(data) => result.succeed(data),
            Err(error) => {
                warn!(
                    req_id = %packet.req_id,
                    handler_id = packet.handler_id,
                    %error,
                    "Packet failed"
                );
                result.fail(error.to_string());
            }
        }
        result
    }

    async fn run_packet(&self, ctx: &CallContext, packet: &Packet) -> Result<Vec<Vec<u8>>> {
        let Some(action) = packet.parsed_action() else {
            let registry = self.registry();
            if registry.get(packet.handler_id).is_none() {
                return Err(ProtocolError::no_handler(packet.handler_id, registry.len()));
            }
            return Err(ProtocolError::UnknownAction {
                code: packet.action,
                handler_id: packet.handler_id,
            });
        };

        let reply = self.call_handler(ctx, packet.handler_id, action, &packet.data).await?;
        let outputs = self.encode_reply(packet.handler_id, reply)?;

        let mut data = Vec::with_capacity(outputs.len());
        for Encoded { bytes, targets } in outputs {
            if !targets.is_empty() {
                self.router.fan_out(Arc::from(bytes.as_slice()), &targets, packet.handler_id);
            }
            data.push(bytes);
        }
        Ok(data)
    }

    fn encode_reply(&self, handler_id: u8, reply: Reply<ErasedPayload<C>>) -> Result<Vec<Encoded>> {
        match reply {
            Reply::Empty => Ok(Vec::new()),
            Reply::Direct(value) => {
                Ok(vec![Encoded { bytes: value.encode_with(&self.codec)?, targets: Vec::new() }])
            }
            Reply::Single(response) => Ok(vec![self.encode_response(handler_id, 0, response)?]),
            Reply::Many(responses) => responses
                .into_iter()
                .enumerate()
                .map(|(index, response)| self.encode_response(handler_id, index, response))
                .collect(),
        }
    }

    fn encode_response(
        &self,
        handler_id: u8,
        index: usize,
        response: Response<ErasedPayload<C>>,
    ) -> Result<Encoded> {
        let (payload, targets) = response.into_parts().map_err(|reason| ProtocolError::Response {
            handler: self.handler_name(usize::from(handler_id)).to_string(),
            index,
            reason,
        })?;
        Ok(Encoded { bytes: payload.encode_with(&self.codec)?, targets })
    }

    fn error_response(&self, req_id: &str, error: &ProtocolError) -> Result<Vec<u8>> {
        let mut result = PacketResult { req_id: req_id.to_string(), ..Default::default() };
        result.fail(error.to_string());
        self.codec.encode(&BatchResponse { results: vec![result] })
    }
}
